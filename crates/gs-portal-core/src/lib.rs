//! Session logic for the GIF stash portal: wallet sessions, the program
//! client, the per-session account cache and the UI mode derived from them.

pub mod error;
pub mod memory;
pub mod program;
pub mod session;
pub mod store;
pub mod ui;
pub mod wallet;

pub use error::PortalError;
pub use memory::InMemoryLedger;
pub use program::{AccountState, ProgramClient, TargetAccount, Timeouts};
pub use session::PortalSession;
pub use store::{AccountStore, AccountView, InitializeOutcome};
pub use wallet::{
    ConnectOutcome, KeypairWallet, SessionSigner, SessionState, WalletError, WalletProvider,
    WalletSessionManager,
};
