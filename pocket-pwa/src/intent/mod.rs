//! UPI intents: building deep-links, dispatching them to payment apps and
//! settling the outcome through user attestation.

pub mod apps;
pub mod attestation;
pub mod builder;
pub mod launcher;

pub use apps::{UpiApp, UPI_APPS};
pub use attestation::{AttestationPrompt, AttestationTracker, Outcome, PendingPayment};
pub use builder::{
    build, build_intent, generate_transaction_id, is_valid_upi_id, parse_intent, Amount,
    IntentUri, PaymentRequest, ScannedIntent, UpiId,
};
pub use launcher::{
    DesktopFallback, DispatchState, LaunchReport, Launcher, LauncherConfig, Platform,
    PlatformError, PlatformKind, TerminalPlatform,
};
