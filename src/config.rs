//! Configuration types for the video room client

use serde::{Deserialize, Serialize};

/// Main configuration for RoomClient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway WebSocket URL (ws:// or wss://)
    pub gateway_url: String,

    /// Bearer token attached to every gateway request (optional)
    pub api_token: Option<String>,

    /// Privileged key for room create/destroy operations (optional)
    pub admin_key: Option<String>,

    /// Video codec requested when creating rooms (default: VP9)
    pub video_codec: VideoCodec,

    /// Timeout for a correlated request in milliseconds (default: 5500ms)
    pub request_timeout_ms: u64,

    /// Session keepalive interval in seconds (default: 25s)
    ///
    /// Must stay below the gateway's session expiry (60s).
    pub keepalive_interval_secs: u64,

    /// How long a subscribe waits for its media track to arrive, in
    /// milliseconds (default: 5000ms)
    pub subscribe_track_timeout_ms: u64,

    /// Grace period before a muted remote track is reported as
    /// unpublished, in milliseconds (default: 2000ms)
    pub mute_debounce_ms: u64,

    /// Reconnection behavior after an unsolicited transport drop
    pub reconnect: ReconnectOptions,
}

/// Reconnection options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectOptions {
    /// Maximum reconnection attempts before giving up (default: 10)
    pub max_attempts: u32,

    /// Maximum total time spent reconnecting in seconds (default: 60s)
    pub max_total_secs: u64,

    /// Quadratic backoff step in milliseconds (default: 300ms)
    ///
    /// Attempt n waits n² × step before retrying.
    pub backoff_step_ms: u64,
}

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    /// VP8 codec (wide compatibility)
    VP8,
    /// VP9 codec (better compression, modern browsers)
    VP9,
    /// H.264 codec (universal compatibility)
    H264,
}

impl VideoCodec {
    /// Get the codec name as the gateway expects it on the wire
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "vp8",
            VideoCodec::VP9 => "vp9",
            VideoCodec::H264 => "h264",
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8188".to_string(),
            api_token: None,
            admin_key: None,
            video_codec: VideoCodec::VP9,
            request_timeout_ms: 5500,
            keepalive_interval_secs: 25,
            subscribe_track_timeout_ms: 5000,
            mute_debounce_ms: 2000,
            reconnect: ReconnectOptions::default(),
        }
    }
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_total_secs: 60,
            backoff_step_ms: 300,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given gateway URL with defaults
    ///
    /// # Example
    ///
    /// ```
    /// use videoroom_client::config::ClientConfig;
    ///
    /// let config = ClientConfig::new("wss://gateway.example.com/ws");
    /// assert!(config.validate().is_ok());
    /// assert_eq!(config.keepalive_interval_secs, 25);
    /// ```
    pub fn new(gateway_url: &str) -> Self {
        Self {
            gateway_url: gateway_url.to_string(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `gateway_url` is not a valid WebSocket URL
    /// - `request_timeout_ms` is not in range 500-30000
    /// - `keepalive_interval_secs` is not in range 1-59
    /// - `reconnect.max_attempts` is zero
    /// - `reconnect.backoff_step_ms` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.gateway_url.starts_with("ws://") && !self.gateway_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "gateway_url must start with ws:// or wss://, got {}",
                self.gateway_url
            )));
        }

        if self.request_timeout_ms < 500 || self.request_timeout_ms > 30000 {
            return Err(Error::InvalidConfig(format!(
                "request_timeout_ms must be in range 500-30000, got {}",
                self.request_timeout_ms
            )));
        }

        // The gateway reaps sessions after 60s without a keepalive
        if self.keepalive_interval_secs == 0 || self.keepalive_interval_secs >= 60 {
            return Err(Error::InvalidConfig(format!(
                "keepalive_interval_secs must be in range 1-59, got {}",
                self.keepalive_interval_secs
            )));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.reconnect.backoff_step_ms == 0 {
            return Err(Error::InvalidConfig(
                "reconnect.backoff_step_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Set the bearer token sent with every gateway request
    ///
    /// Useful for chaining with `new()`.
    pub fn with_token(mut self, token: &str) -> Self {
        self.api_token = Some(token.to_string());
        self
    }

    /// Set the privileged room create/destroy key
    ///
    /// Useful for chaining with `new()`.
    pub fn with_admin_key(mut self, key: &str) -> Self {
        self.admin_key = Some(key.to_string());
        self
    }

    /// Set the preferred video codec for created rooms
    ///
    /// Useful for chaining with `new()`.
    pub fn with_video_codec(mut self, codec: VideoCodec) -> Self {
        self.video_codec = codec;
        self
    }
}
