use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户角色。核心逻辑只使用 `is_staff` 派生判断，
/// 具体的客服分级留给后台系统。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    StaffTier1,
    StaffTier2,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::User)
    }
}

/// 连接身份。在握手认证成功时创建，连接存续期间不可变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn staff_predicate_covers_all_tiers() {
        assert!(!Role::User.is_staff());
        assert!(Role::StaffTier1.is_staff());
        assert!(Role::StaffTier2.is_staff());
    }

    #[test]
    fn role_serializes_snake_case() {
        let identity = Identity::new(UserId::from(Uuid::new_v4()), Role::StaffTier1);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["role"], "staff_tier1");
    }
}
