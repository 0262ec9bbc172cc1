// src/utils/id_generator.rs
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;

/// Kinds of client-local handles that carry a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdType {
    Subscription,
    Notification,
    Window,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Subscription => "sub",
            IdType::Notification => "ntf",
            IdType::Window => "win",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{yymmdd}-{random_suffix}
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d").to_string();
        let random_suffix = Self::generate_random_suffix();

        format!("{}-{}-{}", id_type.to_prefix(), date_part, random_suffix)
    }

    /// 8 characters: 4 hex + 4 alphanumeric
    fn generate_random_suffix() -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        const ALPHANUMERIC_CHARS: &[u8] =
            b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

        format!(
            "{}{}",
            Self::generate_from_chars(HEX_CHARS, 4),
            Self::generate_from_chars(ALPHANUMERIC_CHARS, 4)
        )
    }

    fn generate_from_chars(charset: &[u8], n: usize) -> String {
        let mut rng = rand::rng();
        (0..n)
            .map(|_| charset[rng.random_range(0..charset.len())] as char)
            .collect()
    }
}

pub fn generate_subscription_id() -> String {
    IdGenerator::generate(IdType::Subscription)
}

pub fn generate_notification_id() -> String {
    IdGenerator::generate(IdType::Notification)
}

pub fn generate_window_id() -> String {
    IdGenerator::generate(IdType::Window)
}
