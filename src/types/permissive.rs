use serde::{Serialize, Deserialize};

/// How a movement obtains right-of-way outside its protected green.
/// Absence of a value (JSON `null`) means fully protected with no
/// permissive phase at all.
#[derive(Hash, Eq, PartialEq, Debug, Serialize, Deserialize, Clone, Copy)]
pub enum PermissiveType {
    #[serde(rename = "lt_turn_permissive")]
    LtTurnPermissive,
    #[serde(rename = "lt_turn_protected")]
    LtTurnProtected,
    #[serde(rename = "lt_protected_permissive")]
    LtProtectedPermissive,
}
