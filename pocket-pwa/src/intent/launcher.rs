//! Intent dispatch
//!
//! Hands a built URI to whatever payment app the host will launch. There is
//! no completion callback from the external app, so a launch ends in
//! `Pending` (handed off on mobile) or `Unknown` (desktop fallback shown) and
//! the outcome is settled later by the user's attestation.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::apps::{store_links, UPI_APPS};
use super::builder::{IntentUri, UPI_PREFIX};
use crate::error::PwaError;

/// External QR image service used by the desktop fallback
pub const QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/?size=300x300&data=";

/// Delay between app probes; only one app will claim the link
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(500);

/// How long a probe stays alive before it is torn down
pub const DEFAULT_PROBE_LIFETIME: Duration = Duration::from_millis(1000);

/// Host platform failure while dispatching
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct PlatformError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Mobile,
    Desktop,
}

impl PlatformKind {
    /// Mobile detection by user agent
    pub fn from_user_agent(user_agent: &str) -> Self {
        const MOBILE_MARKERS: &[&str] = &[
            "android",
            "webos",
            "iphone",
            "ipad",
            "ipod",
            "blackberry",
            "iemobile",
            "opera mini",
        ];
        let ua = user_agent.to_ascii_lowercase();
        if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) {
            PlatformKind::Mobile
        } else {
            PlatformKind::Desktop
        }
    }
}

/// Per-attempt dispatch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Built,
    Dispatched,
    /// Handed to an app; waiting for the user to come back
    Pending,
    /// No handoff was observable (desktop fallback)
    Unknown,
}

/// Surface shown when no local UPI app is expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopFallback {
    pub intent: IntentUri,
    pub qr_image_url: String,
    pub store_links: Vec<(&'static str, &'static str)>,
}

impl DesktopFallback {
    pub fn for_intent(intent: &IntentUri) -> Self {
        Self {
            intent: intent.clone(),
            qr_image_url: format!("{}{}", QR_SERVICE_URL, urlencoding::encode(intent.as_str())),
            store_links: store_links(),
        }
    }
}

/// Capabilities the host environment provides for dispatch
#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Whether any request-dispatch capability exists at all
    fn can_dispatch(&self) -> bool {
        true
    }

    /// Point the primary navigation target at the URI
    async fn navigate(&self, uri: &IntentUri) -> Result<(), PlatformError>;

    /// Short-lived invisible navigation probe
    async fn probe(&self, uri: &IntentUri, lifetime: Duration) -> Result<(), PlatformError>;

    async fn present_fallback(&self, fallback: &DesktopFallback) -> Result<(), PlatformError>;
}

/// Result of a launch attempt
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub intent: IntentUri,
    pub state: DispatchState,
    /// Apps whose variant was probed, in order
    pub probed: Vec<&'static str>,
    pub fallback: Option<DesktopFallback>,
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub probe_delay: Duration,
    pub probe_lifetime: Duration,
    /// Probe app-specific schemes after the primary navigation
    pub probe_apps: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            probe_delay: DEFAULT_PROBE_DELAY,
            probe_lifetime: DEFAULT_PROBE_LIFETIME,
            probe_apps: true,
        }
    }
}

/// Dispatches intents through a [`Platform`]
pub struct Launcher<P: Platform> {
    platform: P,
    config: LauncherConfig,
}

impl<P: Platform> Launcher<P> {
    pub fn new(platform: P) -> Self {
        Self::with_config(platform, LauncherConfig::default())
    }

    pub fn with_config(platform: P, config: LauncherConfig) -> Self {
        Self { platform, config }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub async fn launch(&self, intent: &IntentUri) -> Result<LaunchReport, PwaError> {
        if !self.platform.can_dispatch() {
            return Err(PwaError::UnsupportedPlatform(
                "Please ensure you have a UPI app installed or open this page on a phone."
                    .to_string(),
            ));
        }

        let mut report = LaunchReport {
            intent: intent.clone(),
            state: DispatchState::Built,
            probed: Vec::new(),
            fallback: None,
        };

        match self.platform.kind() {
            PlatformKind::Mobile => self.launch_mobile(&mut report).await,
            PlatformKind::Desktop => self.launch_desktop(&mut report).await,
        }

        info!(state = ?report.state, probed = report.probed.len(), "UPI intent dispatched");
        Ok(report)
    }

    async fn launch_mobile(&self, report: &mut LaunchReport) {
        match self.platform.navigate(&report.intent).await {
            Ok(()) => debug!(uri = %report.intent, "Primary navigation set"),
            Err(e) => warn!(error = %e, "Primary navigation failed, probing apps"),
        }
        report.state = DispatchState::Dispatched;

        if self.config.probe_apps {
            // Probes are serialized so only one handoff is live at a time
            for app in UPI_APPS.iter().filter(|app| app.prefix != UPI_PREFIX) {
                let variant = app.intent_for(&report.intent);
                debug!(app = app.name, uri = %variant, "Probing app intent");
                if let Err(e) = self.platform.probe(&variant, self.config.probe_lifetime).await {
                    debug!(app = app.name, error = %e, "App intent probe failed");
                }
                report.probed.push(app.name);
                tokio::time::sleep(self.config.probe_delay).await;
            }
        }

        report.state = DispatchState::Pending;
    }

    async fn launch_desktop(&self, report: &mut LaunchReport) {
        let fallback = DesktopFallback::for_intent(&report.intent);
        report.state = DispatchState::Dispatched;
        if let Err(e) = self.platform.present_fallback(&fallback).await {
            warn!(error = %e, "Could not present desktop fallback");
        }
        report.fallback = Some(fallback);
        report.state = DispatchState::Unknown;
    }
}

/// Platform for the command line: the "page" is the terminal
pub struct TerminalPlatform {
    kind: PlatformKind,
}

impl TerminalPlatform {
    pub fn new(user_agent: &str) -> Self {
        Self {
            kind: PlatformKind::from_user_agent(user_agent),
        }
    }
}

#[async_trait]
impl Platform for TerminalPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    async fn navigate(&self, uri: &IntentUri) -> Result<(), PlatformError> {
        println!("Open this link on your phone to pay:\n  {}", uri);
        Ok(())
    }

    async fn probe(&self, uri: &IntentUri, _lifetime: Duration) -> Result<(), PlatformError> {
        println!("  or: {}", uri);
        Ok(())
    }

    async fn present_fallback(&self, fallback: &DesktopFallback) -> Result<(), PlatformError> {
        println!("Scan the QR code with any UPI app to pay:");
        println!("  {}", fallback.qr_image_url);
        println!("Or download a UPI app:");
        for (name, url) in &fallback.store_links {
            println!("  {}: {}", name, url);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::intent::builder::build;
    use std::sync::Mutex;

    /// Records every dispatch call
    #[derive(Default)]
    pub(crate) struct RecordingPlatform {
        pub mobile: bool,
        pub unsupported: bool,
        pub fail_navigation: bool,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Platform for RecordingPlatform {
        fn kind(&self) -> PlatformKind {
            if self.mobile {
                PlatformKind::Mobile
            } else {
                PlatformKind::Desktop
            }
        }

        fn can_dispatch(&self) -> bool {
            !self.unsupported
        }

        async fn navigate(&self, uri: &IntentUri) -> Result<(), PlatformError> {
            self.calls.lock().unwrap().push(format!("navigate {}", uri));
            if self.fail_navigation {
                return Err(PlatformError("blocked".into()));
            }
            Ok(())
        }

        async fn probe(&self, uri: &IntentUri, _lifetime: Duration) -> Result<(), PlatformError> {
            self.calls.lock().unwrap().push(format!("probe {}", uri));
            Ok(())
        }

        async fn present_fallback(&self, fallback: &DesktopFallback) -> Result<(), PlatformError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fallback {}", fallback.qr_image_url));
            Ok(())
        }
    }

    fn fast_config() -> LauncherConfig {
        LauncherConfig {
            probe_delay: Duration::from_millis(1),
            probe_lifetime: Duration::from_millis(1),
            probe_apps: true,
        }
    }

    #[test]
    fn test_platform_detection() {
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36";
        let mac = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15";
        assert_eq!(PlatformKind::from_user_agent(android), PlatformKind::Mobile);
        assert_eq!(PlatformKind::from_user_agent(mac), PlatformKind::Desktop);
    }

    #[tokio::test]
    async fn test_mobile_navigates_then_probes_in_order() {
        let platform = RecordingPlatform {
            mobile: true,
            ..Default::default()
        };
        let launcher = Launcher::with_config(platform, fast_config());
        let intent = build("a@b", "5", None, Some("T"), None).unwrap();

        let report = launcher.launch(&intent).await.unwrap();
        assert_eq!(report.state, DispatchState::Pending);
        assert_eq!(report.probed, vec!["PhonePe", "Google Pay", "Paytm"]);

        let calls = launcher.platform().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].starts_with("navigate upi://pay?"));
        assert!(calls[1].starts_with("probe phonepe://pay?"));
        assert!(calls[2].starts_with("probe tez://upi/pay?"));
        assert!(calls[3].starts_with("probe paytmmp://pay?"));
    }

    #[tokio::test]
    async fn test_navigation_failure_still_probes() {
        let platform = RecordingPlatform {
            mobile: true,
            fail_navigation: true,
            ..Default::default()
        };
        let launcher = Launcher::with_config(platform, fast_config());
        let intent = build("a@b", "5", None, None, None).unwrap();
        let report = launcher.launch(&intent).await.unwrap();
        assert_eq!(report.state, DispatchState::Pending);
        assert_eq!(report.probed.len(), 3);
    }

    #[tokio::test]
    async fn test_desktop_presents_qr_fallback() {
        let launcher = Launcher::with_config(RecordingPlatform::default(), fast_config());
        let intent = build("a@b", "5", None, Some("T"), None).unwrap();

        let report = launcher.launch(&intent).await.unwrap();
        assert_eq!(report.state, DispatchState::Unknown);
        let fallback = report.fallback.unwrap();
        assert!(fallback.qr_image_url.starts_with(QR_SERVICE_URL));
        assert!(fallback.qr_image_url.contains("upi%3A%2F%2Fpay%3Fpa%3Da%2540b"));
        assert_eq!(fallback.store_links.len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let platform = RecordingPlatform {
            unsupported: true,
            ..Default::default()
        };
        let launcher = Launcher::new(platform);
        let intent = build("a@b", "5", None, None, None).unwrap();
        let err = launcher.launch(&intent).await.unwrap_err();
        assert!(matches!(err, PwaError::UnsupportedPlatform(_)));
        assert!(launcher.platform().calls.lock().unwrap().is_empty());
    }
}
