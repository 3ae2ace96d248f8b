use std::fmt;

use serde::{Deserialize, Serialize};

/// トラッキングシステム内の剛体ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl BodyId {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 剛体上のターゲット番号（ビーコン群ひとつ分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub u8);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// (剛体, ターゲット) の組。映像トラッキングの単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyTargetId {
    pub body: BodyId,
    pub target: TargetId,
}

impl BodyTargetId {
    pub fn new(body: BodyId, target: TargetId) -> Self {
        Self { body, target }
    }
}

impl fmt::Display for BodyTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.body, self.target)
    }
}
