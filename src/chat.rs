//! Type definitions for chat primitives

/// The author of a `Message`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A `System` message is an authoritative message which is used to
    /// instruct the model. Usually, it appears as the first message
    /// in a dialog.
    System,

    /// A message authored by the user
    User,

    /// A message authored by the model
    Model,
}

/// A `Message` in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The author of the message
    pub role: Role,
    /// The contents of the message
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: String) -> Message {
        Message { role, content }
    }

    pub fn system<S: Into<String>>(content: S) -> Message {
        Message::new(Role::System, content.into())
    }

    pub fn user<S: Into<String>>(content: S) -> Message {
        Message::new(Role::User, content.into())
    }
}
