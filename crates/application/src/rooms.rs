//! 房间注册表
//!
//! room key → 当前挂在该房间上的连接集合，提供 join / leave / broadcast
//! 原语。广播对调用瞬间已挂接的每个成员至少送达一次，未挂接的成员
//! 没有持久化保证（由补拉路径兜底）。
//!
//! 锁内绝不跨越 await 点：所有变更都是同步的读改写，
//! 避免连接任务之间的丢失更新。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;

use domain::{ConnectionId, Identity, RoomKey, UserId};

use crate::events::OutboundEvent;

/// 每连接的出站通道；无界发送不会阻塞广播方
pub type ConnectionSender = mpsc::UnboundedSender<OutboundEvent>;

struct ConnectionEntry {
    identity: Identity,
    sender: ConnectionSender,
    joined: HashSet<RoomKey>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
    user_connections: HashMap<UserId, HashSet<ConnectionId>>,
}

/// 连接 / 房间映射的唯一持有者。单进程内的权威状态。
#[derive(Default)]
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // 锁内没有 panic 路径，中毒只会来自不可恢复的 bug
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 注册连接。在任何房间加入之前调用。
    pub fn register(&self, connection_id: ConnectionId, identity: Identity, sender: ConnectionSender) {
        let mut inner = self.lock();
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                sender,
                joined: HashSet::new(),
            },
        );
        inner
            .user_connections
            .entry(identity.user_id)
            .or_default()
            .insert(connection_id);
        tracing::debug!(connection_id = %connection_id, user_id = %identity.user_id, "connection registered");
    }

    /// 注销连接并离开所有房间。返回它当时加入的房间集合。
    pub fn unregister(&self, connection_id: ConnectionId) -> Vec<RoomKey> {
        let mut inner = self.lock();
        let Some(entry) = inner.connections.remove(&connection_id) else {
            return Vec::new();
        };
        for room in &entry.joined {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&connection_id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }
        if let Some(conns) = inner.user_connections.get_mut(&entry.identity.user_id) {
            conns.remove(&connection_id);
            if conns.is_empty() {
                inner.user_connections.remove(&entry.identity.user_id);
            }
        }
        tracing::debug!(connection_id = %connection_id, "connection unregistered");
        entry.joined.into_iter().collect()
    }

    /// 把连接加入房间。未注册的连接直接忽略。
    pub fn join(&self, room: RoomKey, connection_id: ConnectionId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.joined.insert(room);
        } else {
            return;
        }
        inner.rooms.entry(room).or_default().insert(connection_id);
    }

    pub fn leave(&self, room: RoomKey, connection_id: ConnectionId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.joined.remove(&room);
        }
        if let Some(members) = inner.rooms.get_mut(&room) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(&room);
            }
        }
    }

    pub fn is_joined(&self, room: RoomKey, connection_id: ConnectionId) -> bool {
        let inner = self.lock();
        inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.joined.contains(&room))
            .unwrap_or(false)
    }

    /// 向房间内每个当前挂接的成员投递事件
    pub fn broadcast(&self, room: RoomKey, event: &OutboundEvent, exclude: Option<ConnectionId>) {
        self.broadcast_filtered(room, exclude, |_| Some(event.clone()));
    }

    /// 逐收件人决定投递内容。工单房间混合客服与非客服连接，
    /// 内部消息的过滤必须发生在这里而不是事件构造处。
    pub fn broadcast_filtered<F>(&self, room: RoomKey, exclude: Option<ConnectionId>, select: F)
    where
        F: Fn(&Identity) -> Option<OutboundEvent>,
    {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(&room) else {
            return;
        };
        for connection_id in members {
            if Some(*connection_id) == exclude {
                continue;
            }
            let Some(entry) = inner.connections.get(connection_id) else {
                continue;
            };
            let Some(event) = select(&entry.identity) else {
                continue;
            };
            if entry.sender.send(event).is_err() {
                // 接收端已随连接关闭丢弃；注销路径会清掉这条记录
                tracing::debug!(connection_id = %connection_id, room = %room, "dropping event for closed connection");
            }
        }
    }

    /// 定向投递给单个连接（ack 之外的直发通道）
    pub fn send_to_connection(&self, connection_id: ConnectionId, event: OutboundEvent) {
        let inner = self.lock();
        if let Some(entry) = inner.connections.get(&connection_id) {
            if entry.sender.send(event).is_err() {
                tracing::debug!(connection_id = %connection_id, "dropping event for closed connection");
            }
        }
    }

    /// 向某个用户的所有在线连接投递（用于会话创建通知）
    pub fn send_to_user(&self, user_id: UserId, event: &OutboundEvent) {
        let inner = self.lock();
        let Some(conns) = inner.user_connections.get(&user_id) else {
            return;
        };
        for connection_id in conns {
            if let Some(entry) = inner.connections.get(connection_id) {
                let _ = entry.sender.send(event.clone());
            }
        }
    }

    /// 把某个用户的所有在线连接加入房间（会话创建后立即可收发）
    pub fn join_user_connections(&self, room: RoomKey, user_id: UserId) {
        let mut inner = self.lock();
        let Some(conns) = inner.user_connections.get(&user_id).cloned() else {
            return;
        };
        for connection_id in conns {
            let registered = match inner.connections.get_mut(&connection_id) {
                Some(entry) => {
                    entry.joined.insert(room);
                    true
                }
                None => false,
            };
            if registered {
                inner.rooms.entry(room).or_default().insert(connection_id);
            }
        }
    }

    pub fn room_size(&self, room: RoomKey) -> usize {
        let inner = self.lock();
        inner.rooms.get(&room).map(|m| m.len()).unwrap_or(0)
    }
}
