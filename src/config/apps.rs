//! App name to package name mapping for commonly requested applications.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Mapping from app display names to Android package names, rendered into
/// the executor prompt to steer `launch_app`.
pub static APP_PACKAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // System
        ("Settings", "com.android.settings"),
        ("Camera", "com.android.camera2"),
        ("Clock", "com.google.android.deskclock"),
        ("Contacts", "com.google.android.contacts"),
        ("Phone", "com.google.android.dialer"),
        ("Messages", "com.google.android.apps.messaging"),
        ("Files", "com.google.android.documentsui"),
        ("Play Store", "com.android.vending"),
        // Google
        ("Chrome", "com.android.chrome"),
        ("Gmail", "com.google.android.gm"),
        ("Maps", "com.google.android.apps.maps"),
        ("YouTube", "com.google.android.youtube"),
        ("Photos", "com.google.android.apps.photos"),
        ("Calendar", "com.google.android.calendar"),
        ("Drive", "com.google.android.apps.docs"),
        // Social & messaging
        ("WhatsApp", "com.whatsapp"),
        ("Telegram", "org.telegram.messenger"),
        ("Instagram", "com.instagram.android"),
        ("Facebook", "com.facebook.katana"),
        ("X", "com.twitter.android"),
        ("Signal", "org.thoughtcrime.securesms"),
        ("Discord", "com.discord"),
        // Media & shopping
        ("Spotify", "com.spotify.music"),
        ("Netflix", "com.netflix.mediaclient"),
        ("Amazon", "com.amazon.mShop.android.shopping"),
    ])
});

/// Render the package table for a system prompt, sorted by app name.
pub fn format_app_packages() -> String {
    let mut entries: Vec<_> = APP_PACKAGES.iter().collect();
    entries.sort_by_key(|(name, _)| *name);
    entries
        .iter()
        .map(|(name, package)| format!("- {name}: {package}"))
        .collect::<Vec<_>>()
        .join("\n")
}
