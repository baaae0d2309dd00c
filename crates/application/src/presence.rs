//! 在线状态跟踪
//!
//! identity → 活跃连接集合。每个身份的 online/offline 边沿各只发射一次：
//! check-empty-then-transition 必须和并发的同身份 connect/disconnect
//! 串行化，否则另一条连接还活着时会冒出假 offline。
//! 整个读改写在一次锁持有内完成，锁内不跨越 await 点。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use domain::{ConnectionId, UserId};

/// connect / disconnect 的边沿结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// 空集合 → 非空：广播 user:online
    CameOnline,
    /// 非空 → 空：广播 user:offline
    WentOffline,
    /// 同身份还有其他活跃连接，无边沿
    NoChange,
}

#[derive(Default)]
pub struct PresenceTracker {
    connections: Mutex<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, HashSet<ConnectionId>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connect(&self, user_id: UserId, connection_id: ConnectionId) -> PresenceTransition {
        let mut connections = self.lock();
        let set = connections.entry(user_id).or_default();
        let was_empty = set.is_empty();
        set.insert(connection_id);
        if was_empty {
            tracing::debug!(user_id = %user_id, "user came online");
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::NoChange
        }
    }

    pub fn disconnect(&self, user_id: UserId, connection_id: ConnectionId) -> PresenceTransition {
        let mut connections = self.lock();
        let Some(set) = connections.get_mut(&user_id) else {
            return PresenceTransition::NoChange;
        };
        if !set.remove(&connection_id) {
            return PresenceTransition::NoChange;
        }
        if set.is_empty() {
            connections.remove(&user_id);
            tracing::debug!(user_id = %user_id, "user went offline");
            PresenceTransition::WentOffline
        } else {
            PresenceTransition::NoChange
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        let connections = self.lock();
        connections
            .get(&user_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        let connections = self.lock();
        connections.get(&user_id).map(|set| set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn online_fires_once_per_identity_edge() {
        let tracker = PresenceTracker::new();
        let user = UserId::from(Uuid::new_v4());
        let conn_a = ConnectionId::generate();
        let conn_b = ConnectionId::generate();

        assert_eq!(tracker.connect(user, conn_a), PresenceTransition::CameOnline);
        assert_eq!(tracker.connect(user, conn_b), PresenceTransition::NoChange);
    }

    #[test]
    fn offline_fires_only_when_last_connection_closes() {
        let tracker = PresenceTracker::new();
        let user = UserId::from(Uuid::new_v4());
        let conn_a = ConnectionId::generate();
        let conn_b = ConnectionId::generate();

        tracker.connect(user, conn_a);
        tracker.connect(user, conn_b);

        assert_eq!(
            tracker.disconnect(user, conn_a),
            PresenceTransition::NoChange
        );
        assert!(tracker.is_online(user));
        assert_eq!(
            tracker.disconnect(user, conn_b),
            PresenceTransition::WentOffline
        );
        assert!(!tracker.is_online(user));
    }

    #[test]
    fn duplicate_disconnect_is_inert() {
        let tracker = PresenceTracker::new();
        let user = UserId::from(Uuid::new_v4());
        let conn = ConnectionId::generate();

        tracker.connect(user, conn);
        assert_eq!(tracker.disconnect(user, conn), PresenceTransition::WentOffline);
        assert_eq!(tracker.disconnect(user, conn), PresenceTransition::NoChange);
    }

    #[test]
    fn interleaved_connect_disconnect_never_strands_offline() {
        // 两个任务交错：断开第一条连接时第二条已建立，不应出现 offline 边沿
        let tracker = PresenceTracker::new();
        let user = UserId::from(Uuid::new_v4());
        let conn_a = ConnectionId::generate();
        let conn_b = ConnectionId::generate();

        tracker.connect(user, conn_a);
        tracker.connect(user, conn_b);
        assert_eq!(
            tracker.disconnect(user, conn_a),
            PresenceTransition::NoChange
        );
        assert_eq!(tracker.connect(user, conn_a), PresenceTransition::NoChange);
    }
}
