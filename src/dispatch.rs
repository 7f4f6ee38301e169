//! Routes decoded commands to the services that execute them.
//!
//! Every command produces a [`Response`]; failures of any kind become
//! `status: error` responses so one bad command never costs the client its
//! connection. Work that may block (capability calls, capture, encoding,
//! filesystem access) runs on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::capability::{Capabilities, CapabilityError, MouseButton, PowerAction};
use crate::files::FileService;
use crate::frame::{self, FrameSettings, Resample};
use crate::protocol::{Command, Response, Status};
use crate::server::ConnectionId;
use crate::stream::{FrameGate, StreamConfig, StreamSessions};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

#[derive(Debug, Serialize)]
struct FramePayload {
    image: String,
    frame_size: usize,
    width: u32,
    height: u32,
    original_width: u32,
    original_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
}

impl FramePayload {
    fn from_frame(frame: frame::EncodedFrame) -> Self {
        Self {
            frame_size: frame.jpeg.len(),
            image: STANDARD.encode(&frame.jpeg),
            width: frame.width,
            height: frame.height,
            original_width: frame.original_width,
            original_height: frame.original_height,
            timestamp: None,
            scale: None,
        }
    }
}

/// Executes commands on behalf of connections.
#[derive(Clone)]
pub struct Dispatcher {
    capabilities: Arc<dyn Capabilities>,
    files: Arc<FileService>,
    streams: Arc<StreamSessions>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("files", &self.files)
            .field("streams", &self.streams)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        capabilities: Arc<dyn Capabilities>,
        files: FileService,
        streams: Arc<StreamSessions>,
    ) -> Self {
        Self {
            capabilities,
            files: Arc::new(files),
            streams,
        }
    }

    pub fn streams(&self) -> &Arc<StreamSessions> {
        &self.streams
    }

    /// Runs one command for `connection` and returns its response.
    pub async fn dispatch(&self, connection: ConnectionId, command: Command) -> Response {
        let kind = command.kind();
        let response = match command {
            Command::SystemInfo {} => self.system_info().await,
            Command::GetApps {} => self.get_apps().await,
            Command::LaunchApp { path } => self.launch_app(path).await,
            Command::BrowseFiles { path } => self.browse_files(path).await,
            Command::ListFiles {} => self.list_files().await,
            Command::DownloadFile { path } => self.download_file(path).await,
            Command::UploadFile { filename, data } => self.upload_file(filename, data).await,
            Command::OpenFile { file_path } => self.open_file(file_path).await,
            Command::MouseMove { x, y } => {
                self.input(move |caps| caps.move_cursor(x, y)).await
            }
            Command::MouseClick { button } => {
                self.input(move |caps| caps.click(button, 1, None)).await
            }
            Command::TypeText { text } => self.input(move |caps| caps.type_text(&text)).await,
            Command::KeyPress { key: None } => Response::success(),
            Command::KeyPress { key: Some(key) } => {
                self.input(move |caps| caps.press_key(&key)).await
            }
            Command::Hotkey { keys } => self.hotkey(keys).await,
            Command::Scroll { clicks } => self.input(move |caps| caps.scroll(clicks)).await,
            Command::Volume { action } => self.media_key(volume_key(action.as_deref())).await,
            Command::Media { action } => self.media_key(media_key(action.as_deref())).await,
            Command::SystemAction { action } => self.system_action(action).await,
            Command::StartStream {
                quality,
                scale,
                fps,
            } => self.start_stream(connection, quality, scale, fps),
            Command::StopStream {} => self.stop_stream(connection),
            Command::GetStreamFrame {} => self.stream_frame(connection).await,
            Command::Screenshot { quality, scale } => self.screenshot(quality, scale).await,
            Command::ClickAtPosition {
                x,
                y,
                button,
                clicks,
            } => self.click_at(x, y, button, clicks).await,
        };
        if response.status() == Status::Error {
            warn!(
                target: DISPATCH_TARGET,
                connection = %connection,
                command = %kind,
                error = response.message().unwrap_or_default(),
                "command failed"
            );
        }
        response
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, String>
    where
        F: FnOnce(&dyn Capabilities, &FileService) -> T + Send + 'static,
        T: Send + 'static,
    {
        let capabilities = Arc::clone(&self.capabilities);
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || work(capabilities.as_ref(), &files))
            .await
            .map_err(|error| format!("command task failed: {error}"))
    }

    async fn input<F>(&self, action: F) -> Response
    where
        F: FnOnce(&dyn Capabilities) -> Result<(), CapabilityError> + Send + 'static,
    {
        match self.run_blocking(move |caps, _| action(caps)).await {
            Ok(Ok(())) => Response::success(),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn system_info(&self) -> Response {
        match self.run_blocking(|caps, _| caps.system_info()).await {
            Ok(info) => payload_response(&info),
            Err(message) => Response::success().with_field("error", message),
        }
    }

    async fn get_apps(&self) -> Response {
        let apps = match self.run_blocking(|caps, _| caps.list_apps()).await {
            Ok(Ok(apps)) => apps,
            Ok(Err(error)) => {
                warn!(target: DISPATCH_TARGET, error = %error, "application discovery failed");
                Vec::new()
            }
            Err(message) => {
                warn!(target: DISPATCH_TARGET, error = message, "application discovery failed");
                Vec::new()
            }
        };
        payload_response(&json!({ "apps": apps }))
    }

    async fn launch_app(&self, path: Option<String>) -> Response {
        let Some(path) = non_empty(path) else {
            return Response::error("No app path provided");
        };
        let target = path.clone();
        match self.run_blocking(move |caps, _| caps.launch(&target)).await {
            Ok(Ok(())) => Response::success().with_message(format!("Launched {path}")),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn browse_files(&self, path: Option<String>) -> Response {
        let path = non_empty(path).map(PathBuf::from);
        let result = self
            .run_blocking(move |_, files| files.browse(path.as_deref()))
            .await;
        match result {
            Ok(Ok(listing)) => payload_response(&listing),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn list_files(&self) -> Response {
        match self.run_blocking(|_, files| files.list_for_download()).await {
            Ok(records) => payload_response(&json!({ "files": records })),
            Err(message) => Response::error(message),
        }
    }

    async fn download_file(&self, path: Option<String>) -> Response {
        let Some(path) = non_empty(path) else {
            return Response::error("No file path provided");
        };
        let result = self
            .run_blocking(move |_, files| files.download(Path::new(&path)))
            .await;
        match result {
            Ok(Ok(file)) => payload_response(&file),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn upload_file(&self, filename: Option<String>, data: Option<String>) -> Response {
        let (Some(filename), Some(data)) = (non_empty(filename), non_empty(data)) else {
            return Response::error("Missing filename or data");
        };
        let result = self
            .run_blocking(move |_, files| files.upload(&filename, &data))
            .await;
        match result {
            Ok(Ok(receipt)) => payload_response(&receipt),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn open_file(&self, file_path: Option<String>) -> Response {
        let Some(file_path) = non_empty(file_path) else {
            return Response::error("No file path provided");
        };
        let target = PathBuf::from(&file_path);
        match self.run_blocking(move |caps, _| caps.open_path(&target)).await {
            Ok(Ok(())) => Response::success().with_message(format!("Opened {file_path}")),
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    async fn hotkey(&self, keys: Vec<String>) -> Response {
        if keys.is_empty() {
            return Response::error("No keys specified");
        }
        let label = format!("Hotkey: {}", keys.join("+"));
        match self.input(move |caps| caps.hotkey(&keys)).await {
            response if response.status() == Status::Success => {
                response.with_message(label)
            }
            response => response,
        }
    }

    /// Unrecognised volume and media actions are accepted and ignored.
    async fn media_key(&self, key: Option<&'static str>) -> Response {
        match key {
            Some(key) => self.input(move |caps| caps.press_key(key)).await,
            None => Response::success(),
        }
    }

    async fn system_action(&self, action: Option<String>) -> Response {
        let Some(action) = action.as_deref().and_then(PowerAction::parse) else {
            debug!(target: DISPATCH_TARGET, action = ?action, "ignoring unknown system action");
            return Response::success();
        };
        match self.run_blocking(move |caps, _| caps.power_action(action)).await {
            Ok(Ok(())) => Response::success(),
            // Matches the long-standing client contract: a desktop without
            // any lock or monitor utility still reports success.
            Ok(Err(CapabilityError::Exhausted { .. })) => {
                warn!(
                    target: DISPATCH_TARGET,
                    action = action.as_str(),
                    "no command available for system action"
                );
                Response::success()
            }
            Ok(Err(error)) => Response::error(error.to_string()),
            Err(message) => Response::error(message),
        }
    }

    fn start_stream(
        &self,
        connection: ConnectionId,
        quality: i64,
        scale: f64,
        fps: f64,
    ) -> Response {
        let config = match StreamConfig::new(quality, scale, fps) {
            Ok(config) => config,
            Err(error) => return Response::error(format!("Failed to start stream: {error}")),
        };
        self.streams.start(connection, config);
        info!(
            target: DISPATCH_TARGET,
            connection = %connection,
            fps = config.fps(),
            quality = config.settings().quality(),
            scale = config.settings().scale(),
            "stream started"
        );
        Response::success()
            .with_message("Stream started")
            .with_field("stream_id", connection.get())
    }

    fn stop_stream(&self, connection: ConnectionId) -> Response {
        if self.streams.stop(connection) {
            info!(target: DISPATCH_TARGET, connection = %connection, "stream stopped");
        }
        Response::success().with_message("Stream stopped")
    }

    async fn stream_frame(&self, connection: ConnectionId) -> Response {
        let settings = match self.streams.next_frame(connection, Instant::now()) {
            FrameGate::Ready(settings) => settings,
            FrameGate::Throttled { wait } => return Response::throttled(wait.as_secs_f64()),
            FrameGate::NotStarted => return Response::error("Stream not started"),
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();

        match self.capture(settings, Resample::Bilinear).await {
            Ok(mut payload) => {
                payload.timestamp = Some(timestamp);
                payload_response(&payload)
            }
            Err(message) => Response::error(format!("Frame capture failed: {message}")),
        }
    }

    async fn screenshot(&self, quality: i64, scale: f64) -> Response {
        let settings = match FrameSettings::new(quality, scale) {
            Ok(settings) => settings,
            Err(error) => return Response::error(format!("Screenshot failed: {error}")),
        };
        match self.capture(settings, Resample::for_preview(settings.scale())).await {
            Ok(mut payload) => {
                payload.scale = Some(settings.scale());
                payload_response(&payload)
            }
            Err(message) => Response::error(format!("Screenshot failed: {message}")),
        }
    }

    async fn capture(
        &self,
        settings: FrameSettings,
        resample: Resample,
    ) -> Result<FramePayload, String> {
        self.run_blocking(move |caps, _| {
            let screen = caps.capture_screen().map_err(|error| error.to_string())?;
            let frame =
                frame::encode(screen, settings, resample).map_err(|error| error.to_string())?;
            Ok(FramePayload::from_frame(frame))
        })
        .await?
    }

    async fn click_at(&self, x: i32, y: i32, button: MouseButton, clicks: u32) -> Response {
        let response = self
            .input(move |caps| caps.click(button, clicks, Some((x, y))))
            .await;
        if response.status() != Status::Success {
            return response;
        }
        let verb = if clicks == 2 { "Double-clicked" } else { "Clicked" };
        response.with_message(format!("{verb} at ({x}, {y})"))
    }
}

fn payload_response<T: Serialize>(payload: &T) -> Response {
    Response::success()
        .with_payload(payload)
        .unwrap_or_else(|error| Response::error(format!("failed to encode response: {error}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn volume_key(action: Option<&str>) -> Option<&'static str> {
    match action? {
        "up" => Some("volumeup"),
        "down" => Some("volumedown"),
        "mute" => Some("volumemute"),
        _ => None,
    }
}

fn media_key(action: Option<&str>) -> Option<&'static str> {
    match action? {
        "play_pause" => Some("playpause"),
        "next" => Some("nexttrack"),
        "previous" => Some("prevtrack"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{SyntheticCall, SyntheticCapabilities};

    const CONNECTION: ConnectionId = ConnectionId::new(1);

    struct Fixture {
        dispatcher: Dispatcher,
        capabilities: Arc<SyntheticCapabilities>,
        _root: tempfile::TempDir,
    }

    fn fixture_with(capabilities: SyntheticCapabilities) -> Fixture {
        let root = tempfile::tempdir().expect("temp dir");
        let files = FileService::new(
            root.path().to_path_buf(),
            root.path().join("Downloads"),
            vec![root.path().join("Downloads")],
        );
        let capabilities = Arc::new(capabilities);
        let dispatcher = Dispatcher::new(
            capabilities.clone(),
            files,
            Arc::new(StreamSessions::new()),
        );
        Fixture {
            dispatcher,
            capabilities,
            _root: root,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SyntheticCapabilities::with_screen(64, 32))
    }

    async fn run(fixture: &Fixture, request: serde_json::Value) -> Response {
        let command = Command::from_value(request).expect("valid command");
        fixture.dispatcher.dispatch(CONNECTION, command).await
    }

    #[tokio::test]
    async fn frame_without_stream_is_an_error() {
        let fixture = fixture();
        let response = run(&fixture, json!({"type": "get_stream_frame"})).await;
        assert_eq!(response.status(), Status::Error);
        assert_eq!(response.message(), Some("Stream not started"));
    }

    #[tokio::test]
    async fn stream_frames_are_throttled_then_delivered() {
        let fixture = fixture();
        let started = run(
            &fixture,
            json!({"type": "start_stream", "fps": 1, "scale": 0.5, "quality": 40}),
        )
        .await;
        assert_eq!(started.status(), Status::Success);
        assert_eq!(started.field("stream_id"), Some(&json!(CONNECTION.get())));

        let first = run(&fixture, json!({"type": "get_stream_frame"})).await;
        assert_eq!(first.status(), Status::Success);
        assert_eq!(first.field("width"), Some(&json!(32)));
        assert_eq!(first.field("original_width"), Some(&json!(64)));
        assert!(first.field("timestamp").is_some());

        let second = run(&fixture, json!({"type": "get_stream_frame"})).await;
        assert_eq!(second.status(), Status::Throttled);
        let wait = second
            .field("wait")
            .and_then(serde_json::Value::as_f64)
            .expect("wait field");
        assert!(wait > 0.0 && wait <= 1.0);

        let captures = fixture
            .capabilities
            .calls()
            .into_iter()
            .filter(|call| *call == SyntheticCall::Capture)
            .count();
        assert_eq!(captures, 1, "throttled polls must not capture");
    }

    #[tokio::test]
    async fn stop_stream_is_idempotent() {
        let fixture = fixture();
        for _ in 0..2 {
            let response = run(&fixture, json!({"type": "stop_stream"})).await;
            assert_eq!(response.status(), Status::Success);
        }
        run(&fixture, json!({"type": "start_stream"})).await;
        run(&fixture, json!({"type": "stop_stream"})).await;
        assert!(fixture.dispatcher.streams().is_empty());
    }

    #[tokio::test]
    async fn start_stream_rejects_zero_fps() {
        let fixture = fixture();
        let response = run(&fixture, json!({"type": "start_stream", "fps": 0})).await;
        assert_eq!(response.status(), Status::Error);
        assert!(fixture.dispatcher.streams().is_empty());
    }

    #[tokio::test]
    async fn start_stream_accepts_float_parameters() {
        let fixture = fixture();
        let response = run(
            &fixture,
            json!({"type": "start_stream", "fps": 30.0, "quality": 62.7, "scale": 1.0}),
        )
        .await;
        assert_eq!(response.status(), Status::Success);
        assert_eq!(fixture.dispatcher.streams().len(), 1);

        let frame = run(&fixture, json!({"type": "screenshot", "quality": 80.0})).await;
        assert_eq!(frame.status(), Status::Success);
    }

    #[tokio::test]
    async fn screenshot_reports_scale_and_geometry() {
        let fixture = fixture();
        let response = run(&fixture, json!({"type": "screenshot", "scale": 0.25})).await;
        assert_eq!(response.status(), Status::Success);
        assert_eq!(response.field("width"), Some(&json!(16)));
        assert_eq!(response.field("height"), Some(&json!(8)));
        assert_eq!(response.field("scale"), Some(&json!(0.25)));
        assert!(response.field("timestamp").is_none());
    }

    #[tokio::test]
    async fn exhausted_power_fallbacks_still_report_success() {
        // Known quirk kept for client compatibility.
        let fixture = fixture_with(SyntheticCapabilities::new().with_power_exhausted());
        let response = run(&fixture, json!({"type": "system_action", "action": "lock"})).await;
        assert_eq!(response.status(), Status::Success);
        assert_eq!(
            fixture.capabilities.calls(),
            [SyntheticCall::Power(PowerAction::Lock)]
        );
    }

    #[tokio::test]
    async fn unknown_actions_are_silent_no_ops() {
        let fixture = fixture();
        for request in [
            json!({"type": "system_action", "action": "self_destruct"}),
            json!({"type": "volume", "action": "louder"}),
            json!({"type": "media"}),
            json!({"type": "key_press"}),
        ] {
            assert_eq!(run(&fixture, request).await.status(), Status::Success);
        }
        assert!(fixture.capabilities.calls().is_empty());
    }

    #[tokio::test]
    async fn volume_and_media_map_to_keys() {
        let fixture = fixture();
        run(&fixture, json!({"type": "volume", "action": "mute"})).await;
        run(&fixture, json!({"type": "media", "action": "previous"})).await;
        assert_eq!(
            fixture.capabilities.calls(),
            [
                SyntheticCall::PressKey("volumemute".into()),
                SyntheticCall::PressKey("prevtrack".into())
            ]
        );
    }

    #[tokio::test]
    async fn hotkey_requires_keys_and_labels_success() {
        let fixture = fixture();
        let empty = run(&fixture, json!({"type": "hotkey", "keys": []})).await;
        assert_eq!(empty.message(), Some("No keys specified"));

        let combo = run(&fixture, json!({"type": "hotkey", "keys": ["ctrl", "plus"]})).await;
        assert_eq!(combo.status(), Status::Success);
        assert_eq!(combo.message(), Some("Hotkey: ctrl+plus"));
    }

    #[tokio::test]
    async fn click_at_position_describes_double_click() {
        let fixture = fixture();
        let response = run(
            &fixture,
            json!({"type": "click_at_position", "x": 5, "y": 9, "clicks": 2}),
        )
        .await;
        assert_eq!(response.message(), Some("Double-clicked at (5, 9)"));
        assert_eq!(
            fixture.capabilities.calls(),
            [SyntheticCall::Click {
                button: MouseButton::Left,
                clicks: 2,
                position: Some((5, 9))
            }]
        );
    }

    #[tokio::test]
    async fn missing_parameters_are_reported() {
        let fixture = fixture();
        let cases = [
            (json!({"type": "launch_app"}), "No app path provided"),
            (json!({"type": "download_file"}), "No file path provided"),
            (json!({"type": "open_file"}), "No file path provided"),
            (json!({"type": "upload_file", "filename": "a"}), "Missing filename or data"),
        ];
        for (request, message) in cases {
            let response = run(&fixture, request).await;
            assert_eq!(response.status(), Status::Error);
            assert_eq!(response.message(), Some(message));
        }
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_through_dispatch() {
        let fixture = fixture();
        let upload = run(
            &fixture,
            json!({"type": "upload_file", "filename": "a.txt", "data": "aGk="}),
        )
        .await;
        assert_eq!(upload.status(), Status::Success);
        let path = upload
            .field("path")
            .and_then(serde_json::Value::as_str)
            .expect("path field")
            .to_string();

        let download = run(&fixture, json!({"type": "download_file", "path": path})).await;
        assert_eq!(download.field("data"), Some(&json!("aGk=")));
        assert_eq!(download.field("filename"), Some(&json!("a.txt")));
    }

    #[tokio::test]
    async fn get_apps_and_system_info_succeed() {
        let fixture = fixture();
        let apps = run(&fixture, json!({"type": "get_apps"})).await;
        assert_eq!(apps.field("apps").and_then(|a| a.as_array()).map(Vec::len), Some(1));

        let info = run(&fixture, json!({"type": "system_info"})).await;
        assert_eq!(info.status(), Status::Success);
        assert_eq!(info.field("hostname"), Some(&json!("synthetic-host")));
        assert_eq!(info.field("battery"), Some(&json!("N/A")));
    }
}
