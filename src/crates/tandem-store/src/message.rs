//! The message record carried by the broker
//!
//! A [`Message`] is one request to invoke a named actor with positional and
//! keyword arguments. Messages are values: every `with_*` method returns a
//! modified copy that keeps the same `message_id`, and nothing in this crate
//! mutates a message after it has been built.
//!
//! Continuation metadata rides along in the open `options` map. The keys this
//! workspace reserves are listed in [`options`].

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Reserved option keys
pub mod options {
    /// Embedded message to enqueue when this one succeeds
    pub const PIPE_TARGET: &str = "pipe_target";
    /// When set on a pipe target, the previous result is not appended to its args
    pub const PIPE_IGNORE: &str = "pipe_ignore";
    /// Embedded callback message for the group this message completes
    pub const GROUP_COMPLETION: &str = "group_completion";
    /// Initial outstanding count of the group, carried by one child per group
    pub const GROUP_SIZE: &str = "group_size";
    /// Counter key of the group this message completes
    pub const GROUP_ID: &str = "group_id";
    /// Link to the enclosing group's counter, if that group awaits this one
    pub const GROUP_PARENT: &str = "group_parent";
    /// `false` when the actor's results are not written to the result backend
    pub const STORE_RESULTS: &str = "store_results";
}

/// Default queue messages are placed on
pub const DEFAULT_QUEUE: &str = "default";

/// One request to invoke an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    queue_name: String,
    actor_name: String,
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
    #[serde(default)]
    options: Map<String, Value>,
    message_id: String,
    message_timestamp: i64,
}

impl Message {
    /// Create a message for `actor_name` with a fresh identifier
    pub fn new(actor_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            queue_name: DEFAULT_QUEUE.to_string(),
            actor_name: actor_name.into(),
            args,
            kwargs: Map::new(),
            options: Map::new(),
            message_id: Uuid::new_v4().to_string(),
            message_timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Milliseconds since the Unix epoch at which the message was built
    pub fn message_timestamp(&self) -> i64 {
        self.message_timestamp
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Copy of this message placed on another queue
    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Copy of this message with the given keyword arguments
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Copy of this message with replaced positional arguments
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Copy of this message with one more trailing positional argument
    pub fn with_appended_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    /// Copy of this message with `key` set to `value`
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Copy of this message with several options set at once
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options.extend(options);
        self
    }

    /// Copy of this message with `key` removed
    pub fn without_option(mut self, key: &str) -> Self {
        self.options.remove(key);
        self
    }

    /// Full by-value representation, suitable for embedding in another message
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Decode a message embedded under `key`, if present
    pub fn embedded(&self, key: &str) -> Result<Option<Message>> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Message::from_value(value).map(Some).map_err(|e| {
                StoreError::InvalidMessage(format!(
                    "option '{}' of message {} is not a message: {}",
                    key, self.message_id, e
                ))
            }),
        }
    }

    /// The next pipeline stage, if this message has one
    pub fn pipe_target(&self) -> Result<Option<Message>> {
        self.embedded(options::PIPE_TARGET)
    }

    /// Whether this message refuses the previous stage's result
    pub fn pipe_ignore(&self) -> bool {
        self.options
            .get(options::PIPE_IGNORE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether this message's result should be written to the result backend
    pub fn stores_results(&self) -> bool {
        self.options
            .get(options::STORE_RESULTS)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.actor_name, self.message_id)
    }
}
