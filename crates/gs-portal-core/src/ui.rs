use gs_api_types::{Entry, SignerIdentity, UiMode};

use crate::store::AccountView;

/// Only links with this exact (case-sensitive) suffix are displayed.
pub const MEDIA_SUFFIX: &str = ".gif";

pub fn is_displayable(entry: &Entry) -> bool {
    entry.link.ends_with(MEDIA_SUFFIX)
}

/// Display filter; hidden entries stay on the ledger.
pub fn displayable(entries: &[Entry]) -> Vec<Entry> {
    entries.iter().filter(|e| is_displayable(e)).cloned().collect()
}

pub fn ui_mode(signer: Option<&SignerIdentity>, view: &AccountView) -> UiMode {
    if signer.is_none() {
        return UiMode::Disconnected;
    }
    match view {
        AccountView::NotLoaded => UiMode::Loading,
        AccountView::Uninitialized => UiMode::NeedsInitialization,
        AccountView::Initialized(entries) => UiMode::Ready {
            entries: displayable(entries),
        },
        AccountView::FetchFailed(message) => UiMode::Error {
            message: message.clone(),
        },
    }
}
