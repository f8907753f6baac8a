use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::memory::decode_utf16_fixed;

/// Decoded animation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationName {
    Named(String),
    /// The bytes were read but held no decodable name
    Unreadable,
}

impl AnimationName {
    pub fn decode(bytes: &[u8], expected_len: usize) -> Self {
        match decode_utf16_fixed(bytes, expected_len) {
            Some(name) => AnimationName::Named(name),
            None => AnimationName::Unreadable,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnimationName::Named(name) => Some(name),
            AnimationName::Unreadable => None,
        }
    }
}

/// Coarse categories for known player animation codes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnimationClass {
    Idle,
    LightAttack,
    Dodge,
    Roll,
    Move,
    Heal,
}

const IDLE: &[i32] = &[0, 10000000];
const LIGHT_ATTACK: &[i32] = &[
    23030000, 23030010, 23030020, 23030500, 23034000, 23034010, 23034020, 23034500,
];
const DODGE: &[i32] = &[27010, 10027010];
const ROLL: &[i32] = &[27115];
const MOVE: &[i32] = &[10020210, 10020110, 300020110, 300020210];
const HEAL: &[i32] = &[50110, 50111, 50112];

impl AnimationClass {
    pub fn codes(&self) -> &'static [i32] {
        match self {
            AnimationClass::Idle => IDLE,
            AnimationClass::LightAttack => LIGHT_ATTACK,
            AnimationClass::Dodge => DODGE,
            AnimationClass::Roll => ROLL,
            AnimationClass::Move => MOVE,
            AnimationClass::Heal => HEAL,
        }
    }

    /// Class of an animation code, `None` for codes outside the tables.
    pub fn classify(code: i32) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|class| class.codes().contains(&code))
    }
}
