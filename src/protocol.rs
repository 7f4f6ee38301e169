//! Wire types: one JSON object per `\n`-terminated line in each direction.
//!
//! Requests carry a `type` tag plus command-specific fields:
//!
//! ```json
//! {"type":"click_at_position","x":640,"y":360,"clicks":2}
//! ```
//!
//! Responses always carry `status` and flatten their payload beside it:
//!
//! ```json
//! {"status":"success","message":"Double-clicked at (640, 360)"}
//! ```

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::capability::MouseButton;

/// Decoding failures for a syntactically valid JSON line.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command type")]
    UnknownType { tag: Option<String> },
    #[error("Invalid parameters for {kind}: {source}")]
    InvalidParameters {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },
}

impl CommandError {
    /// The command kind named by the request, when it was recognised.
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Self::UnknownType { .. } => None,
            Self::InvalidParameters { kind, .. } => Some(*kind),
        }
    }
}

/// Every command tag the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SystemInfo,
    GetApps,
    LaunchApp,
    BrowseFiles,
    ListFiles,
    DownloadFile,
    UploadFile,
    OpenFile,
    MouseMove,
    MouseClick,
    TypeText,
    KeyPress,
    Hotkey,
    Scroll,
    Volume,
    Media,
    SystemAction,
    StartStream,
    StopStream,
    GetStreamFrame,
    Screenshot,
    ClickAtPosition,
}

impl CommandKind {
    pub const ALL: [Self; 22] = [
        Self::SystemInfo,
        Self::GetApps,
        Self::LaunchApp,
        Self::BrowseFiles,
        Self::ListFiles,
        Self::DownloadFile,
        Self::UploadFile,
        Self::OpenFile,
        Self::MouseMove,
        Self::MouseClick,
        Self::TypeText,
        Self::KeyPress,
        Self::Hotkey,
        Self::Scroll,
        Self::Volume,
        Self::Media,
        Self::SystemAction,
        Self::StartStream,
        Self::StopStream,
        Self::GetStreamFrame,
        Self::Screenshot,
        Self::ClickAtPosition,
    ];

    /// Resolves a wire tag, including the `get_system_info` alias.
    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag == "get_system_info" {
            return Some(Self::SystemInfo);
        }
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SystemInfo => "system_info",
            Self::GetApps => "get_apps",
            Self::LaunchApp => "launch_app",
            Self::BrowseFiles => "browse_files",
            Self::ListFiles => "list_files",
            Self::DownloadFile => "download_file",
            Self::UploadFile => "upload_file",
            Self::OpenFile => "open_file",
            Self::MouseMove => "mouse_move",
            Self::MouseClick => "mouse_click",
            Self::TypeText => "type_text",
            Self::KeyPress => "key_press",
            Self::Hotkey => "hotkey",
            Self::Scroll => "scroll",
            Self::Volume => "volume",
            Self::Media => "media",
            Self::SystemAction => "system_action",
            Self::StartStream => "start_stream",
            Self::StopStream => "stop_stream",
            Self::GetStreamFrame => "get_stream_frame",
            Self::Screenshot => "screenshot",
            Self::ClickAtPosition => "click_at_position",
        }
    }

    /// Continuous pointer input is never answered, so a client can stream it
    /// without reading anything back.
    pub fn is_fire_and_forget(self) -> bool {
        matches!(self, Self::MouseMove | Self::Scroll | Self::ClickAtPosition)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    #[serde(alias = "get_system_info")]
    SystemInfo {},
    GetApps {},
    LaunchApp {
        #[serde(default, alias = "app_path")]
        path: Option<String>,
    },
    BrowseFiles {
        #[serde(default)]
        path: Option<String>,
    },
    ListFiles {},
    DownloadFile {
        #[serde(default)]
        path: Option<String>,
    },
    UploadFile {
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        data: Option<String>,
    },
    OpenFile {
        #[serde(default, alias = "path")]
        file_path: Option<String>,
    },
    MouseMove {
        #[serde(default, deserialize_with = "rounded_i32")]
        x: i32,
        #[serde(default, deserialize_with = "rounded_i32")]
        y: i32,
    },
    MouseClick {
        #[serde(default)]
        button: MouseButton,
    },
    TypeText {
        #[serde(default)]
        text: String,
    },
    KeyPress {
        #[serde(default)]
        key: Option<String>,
    },
    Hotkey {
        #[serde(default)]
        keys: Vec<String>,
    },
    Scroll {
        #[serde(default = "default_scroll_clicks", deserialize_with = "rounded_i32")]
        clicks: i32,
    },
    Volume {
        #[serde(default)]
        action: Option<String>,
    },
    Media {
        #[serde(default)]
        action: Option<String>,
    },
    SystemAction {
        #[serde(default)]
        action: Option<String>,
    },
    StartStream {
        #[serde(default = "default_stream_quality", deserialize_with = "rounded_i64")]
        quality: i64,
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default = "default_fps")]
        fps: f64,
    },
    StopStream {},
    GetStreamFrame {},
    Screenshot {
        #[serde(default = "default_screenshot_quality", deserialize_with = "rounded_i64")]
        quality: i64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    ClickAtPosition {
        #[serde(default, deserialize_with = "rounded_i32")]
        x: i32,
        #[serde(default, deserialize_with = "rounded_i32")]
        y: i32,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_clicks", deserialize_with = "rounded_u32")]
        clicks: u32,
    },
}

fn default_scroll_clicks() -> i32 {
    5
}

fn default_stream_quality() -> i64 {
    50
}

fn default_screenshot_quality() -> i64 {
    30
}

fn default_scale() -> f64 {
    0.5
}

fn default_fps() -> f64 {
    30.0
}

fn default_clicks() -> u32 {
    1
}

// Integer parameters accept any JSON number. Clients computing coordinates
// send floats; values are rounded and saturate at the field's bounds.
fn rounded<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() {
        Ok(value.round())
    } else {
        Err(D::Error::custom("expected a finite number"))
    }
}

fn rounded_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    rounded(deserializer).map(|value| value as i32)
}

fn rounded_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    rounded(deserializer).map(|value| value as u32)
}

fn rounded_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    rounded(deserializer).map(|value| value as i64)
}

impl Command {
    /// Decodes one parsed JSON request.
    pub fn from_value(value: Value) -> Result<Self, CommandError> {
        let tag = value.get("type").and_then(Value::as_str);
        let Some(kind) = tag.and_then(CommandKind::from_tag) else {
            return Err(CommandError::UnknownType {
                tag: tag.map(str::to_string),
            });
        };
        Self::deserialize(value).map_err(|source| CommandError::InvalidParameters { kind, source })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SystemInfo {} => CommandKind::SystemInfo,
            Self::GetApps {} => CommandKind::GetApps,
            Self::LaunchApp { .. } => CommandKind::LaunchApp,
            Self::BrowseFiles { .. } => CommandKind::BrowseFiles,
            Self::ListFiles {} => CommandKind::ListFiles,
            Self::DownloadFile { .. } => CommandKind::DownloadFile,
            Self::UploadFile { .. } => CommandKind::UploadFile,
            Self::OpenFile { .. } => CommandKind::OpenFile,
            Self::MouseMove { .. } => CommandKind::MouseMove,
            Self::MouseClick { .. } => CommandKind::MouseClick,
            Self::TypeText { .. } => CommandKind::TypeText,
            Self::KeyPress { .. } => CommandKind::KeyPress,
            Self::Hotkey { .. } => CommandKind::Hotkey,
            Self::Scroll { .. } => CommandKind::Scroll,
            Self::Volume { .. } => CommandKind::Volume,
            Self::Media { .. } => CommandKind::Media,
            Self::SystemAction { .. } => CommandKind::SystemAction,
            Self::StartStream { .. } => CommandKind::StartStream,
            Self::StopStream {} => CommandKind::StopStream,
            Self::GetStreamFrame {} => CommandKind::GetStreamFrame,
            Self::Screenshot { .. } => CommandKind::Screenshot,
            Self::ClickAtPosition { .. } => CommandKind::ClickAtPosition,
        }
    }
}

/// Response status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Throttled,
}

/// A reply: `status`, optional `message` and flattened payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: Status,
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Response {
    fn with_status(status: Status) -> Self {
        Self {
            status,
            message: None,
            fields: Map::new(),
        }
    }

    pub fn success() -> Self {
        Self::with_status(Status::Success)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(Status::Error).with_message(message)
    }

    /// A throttled frame poll; `wait` is in seconds.
    pub fn throttled(wait: f64) -> Self {
        Self::with_status(Status::Throttled).with_field("wait", wait)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Flattens every field of a serializable struct into the response.
    ///
    /// A `message` field in the payload becomes the response message.
    ///
    /// # Errors
    /// Fails when `payload` does not serialize to a JSON object.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        let Value::Object(fields) = serde_json::to_value(payload)? else {
            return Err(serde::ser::Error::custom("response payload must be an object"));
        };
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("message", Value::String(message)) => self.message = Some(message),
                (_, value) => {
                    self.fields.insert(key, value);
                }
            }
        }
        Ok(self)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serializes as one `\n`-terminated line.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.message.is_some());
        let mut map = serializer.serialize_map(Some(1 + extra + self.fields.len()))?;
        map.serialize_entry("status", &self.status)?;
        if let Some(message) = &self.message {
            map.serialize_entry("message", message)?;
        }
        for (key, value) in &self.fields {
            if key != "status" && key != "message" {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}
