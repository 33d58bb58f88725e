//! Сообщения, которыми обмениваются модули.
//!
//! - `message`: неизменяемое сообщение с разделяемым владением.
//! - `builder`: изменяемая заготовка для создания и модификации копий.
//! - `codec`: сериализация сообщения в байтовый массив и обратно.

pub mod builder;
pub mod codec;
pub mod message;

pub use builder::MessageBuilder;
pub use codec::{decode, encode, MESSAGE_HEADER, MIN_FRAME_LEN};
pub use message::{CodeAnchor, Message, MessageWatch, Properties};
