//! 输入状态跟踪
//!
//! 每 (room, user) 至多一条活跃记录，start 原地刷新过期时间。
//! 过期采用惰性策略：读取方把超过窗口的记录当作不存在并顺手清理，
//! 服务器不做主动扫描、不广播合成的 typing:stop ——
//! 客户端用同样的窗口 W 推断消失（决策记录见 DESIGN.md）。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use domain::{RoomKey, UserId};

pub struct TypingTracker {
    window: Duration,
    entries: Mutex<HashMap<(RoomKey, UserId), Instant>>,
}

impl TypingTracker {
    /// `window` 即线协议里的 W，默认 5 秒（见配置）
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(RoomKey, UserId), Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_live(&self, started: Instant, now: Instant) -> bool {
        now.duration_since(started) < self.window
    }

    /// upsert 并刷新过期时间。返回 true 表示此前没有活跃记录
    /// （调用方此时才广播 typing:start，刷新不重复广播）。
    pub fn start(&self, room: RoomKey, user_id: UserId) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        let was_absent = entries
            .insert((room, user_id), now)
            .map_or(true, |previous| !self.is_live(previous, now));
        was_absent
    }

    /// 删除记录。返回 true 表示删除了一条活跃记录
    /// （过期残留不算，调用方不必广播 typing:stop）。
    pub fn stop(&self, room: RoomKey, user_id: UserId) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        entries
            .remove(&(room, user_id))
            .map_or(false, |started| self.is_live(started, now))
    }

    /// 房间内当前的活跃输入者；过期记录视为不存在并被清理。
    pub fn typists(&self, room: RoomKey) -> Vec<UserId> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, started| now.duration_since(*started) < self.window);
        entries
            .keys()
            .filter(|(r, _)| *r == room)
            .map(|(_, user)| *user)
            .collect()
    }

    /// 断开清理：移除该身份的所有记录，返回其中仍活跃的房间
    /// （调用方对这些房间广播显式 typing:stop）。
    pub fn clear_user(&self, user_id: UserId) -> Vec<RoomKey> {
        let now = Instant::now();
        let mut entries = self.lock();
        let mut live_rooms = Vec::new();
        entries.retain(|(room, user), started| {
            if *user != user_id {
                return true;
            }
            if now.duration_since(*started) < self.window {
                live_rooms.push(*room);
            }
            false
        });
        live_rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ConversationId;
    use uuid::Uuid;

    fn room() -> RoomKey {
        RoomKey::Conversation(ConversationId::from(Uuid::new_v4()))
    }

    #[test]
    fn start_refresh_does_not_rebroadcast() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        let room = room();
        let user = UserId::from(Uuid::new_v4());

        assert!(tracker.start(room, user));
        assert!(!tracker.start(room, user));
    }

    #[test]
    fn state_is_absent_to_readers_after_window() {
        // 反复 start 后不 stop，窗口过后任何读取方都看不到状态
        let tracker = TypingTracker::new(Duration::from_millis(40));
        let room = room();
        let user = UserId::from(Uuid::new_v4());

        tracker.start(room, user);
        tracker.start(room, user);
        assert_eq!(tracker.typists(room), vec![user]);

        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.typists(room).is_empty());

        // 过期后的 start 再次视为新边沿
        assert!(tracker.start(room, user));
    }

    #[test]
    fn stop_on_expired_entry_reports_nothing_to_broadcast() {
        let tracker = TypingTracker::new(Duration::from_millis(20));
        let room = room();
        let user = UserId::from(Uuid::new_v4());

        tracker.start(room, user);
        std::thread::sleep(Duration::from_millis(40));
        assert!(!tracker.stop(room, user));
    }

    #[test]
    fn clear_user_returns_only_live_rooms() {
        let tracker = TypingTracker::new(Duration::from_millis(50));
        let room_a = room();
        let room_b = room();
        let user = UserId::from(Uuid::new_v4());
        let other = UserId::from(Uuid::new_v4());

        tracker.start(room_a, user);
        tracker.start(room_b, other);

        let cleared = tracker.clear_user(user);
        assert_eq!(cleared, vec![room_a]);
        // 其他用户的状态不受影响
        assert_eq!(tracker.typists(room_b), vec![other]);
    }
}
