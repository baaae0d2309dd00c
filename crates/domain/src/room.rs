use std::fmt;

use crate::value_objects::{ConversationId, TicketId};

/// 房间键：广播作用域的稳定标识。
///
/// 房间不是持久化实体，而是参与关系在运行时的投影。
/// 用标签联合代替字符串拼接键，派发时一次 match 搞定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// 普通会话房间 `conversation:<id>`
    Conversation(ConversationId),
    /// 工单房间 `support:<id>`，请求人和客服混在同一房间
    Ticket(TicketId),
    /// 客服共享房间 `support:staff`，接收所有工单活动摘要
    SupportStaff,
}

impl RoomKey {
    pub fn is_conversation(&self) -> bool {
        matches!(self, RoomKey::Conversation(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Conversation(id) => write!(f, "conversation:{}", id),
            RoomKey::Ticket(id) => write!(f, "support:{}", id),
            RoomKey::SupportStaff => f.write_str("support:staff"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn room_keys_render_stable_strings() {
        let id = Uuid::new_v4();
        assert_eq!(
            RoomKey::Conversation(ConversationId::from(id)).to_string(),
            format!("conversation:{id}")
        );
        assert_eq!(
            RoomKey::Ticket(TicketId::from(id)).to_string(),
            format!("support:{id}")
        );
        assert_eq!(RoomKey::SupportStaff.to_string(), "support:staff");
    }
}
