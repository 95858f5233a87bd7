//! Known UPI apps and their deep-link schemes

use super::builder::{IntentUri, UPI_PREFIX};

/// A payment app that can claim an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpiApp {
    pub name: &'static str,
    pub package_name: &'static str,
    /// Scheme and host the app registers; query string is appended as-is
    pub prefix: &'static str,
    pub store_url: &'static str,
}

impl UpiApp {
    /// App-specific variant of a generic intent
    pub fn intent_for(&self, generic: &IntentUri) -> IntentUri {
        generic.with_prefix(self.prefix)
    }
}

/// Probe order on mobile. Only the first three have dedicated schemes; the
/// rest claim the generic `upi://` link.
pub const UPI_APPS: &[UpiApp] = &[
    UpiApp {
        name: "PhonePe",
        package_name: "com.phonepe.app",
        prefix: "phonepe://pay",
        store_url: "https://play.google.com/store/apps/details?id=com.phonepe.app",
    },
    UpiApp {
        name: "Google Pay",
        package_name: "com.google.android.apps.nfc.payment",
        prefix: "tez://upi/pay",
        store_url:
            "https://play.google.com/store/apps/details?id=com.google.android.apps.nfc.payment",
    },
    UpiApp {
        name: "Paytm",
        package_name: "net.one97.paytm",
        prefix: "paytmmp://pay",
        store_url: "https://play.google.com/store/apps/details?id=net.one97.paytm",
    },
    UpiApp {
        name: "BHIM",
        package_name: "in.org.npci.upiapp",
        prefix: UPI_PREFIX,
        store_url: "https://play.google.com/store/apps/details?id=in.org.npci.upiapp",
    },
    UpiApp {
        name: "Amazon Pay",
        package_name: "in.amazon.mShop.android.shopping",
        prefix: UPI_PREFIX,
        store_url:
            "https://play.google.com/store/apps/details?id=in.amazon.mShop.android.shopping",
    },
];

/// Apps offered as download links on the desktop fallback
pub fn store_links() -> Vec<(&'static str, &'static str)> {
    UPI_APPS
        .iter()
        .filter(|app| app.prefix != UPI_PREFIX)
        .map(|app| (app.name, app.store_url))
        .collect()
}
