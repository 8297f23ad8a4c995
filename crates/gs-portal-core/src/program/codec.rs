//! Byte layout of the stash program (Anchor framework conventions).
//!
//! Instructions: `sha256("global:<name>")[..8] || borsh(args)`.
//! Account: `sha256("account:BaseAccount")[..8] || borsh(BaseAccount)`, followed
//! by zero padding up to the allocated space.

use borsh::{BorshDeserialize, BorshSerialize};
use gs_api_types::Entry;
use gs_chain_client::Pubkey;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const INITIALIZE_IX: &str = "start_stuff_off";
pub const APPEND_IX: &str = "add_gif";
pub const ACCOUNT_NAME: &str = "BaseAccount";

/// Bytes the program allocates for the target account.
pub const ACCOUNT_SPACE: usize = 9000;

pub type Discriminator = [u8; 8];

fn discriminator(namespace: &str, name: &str) -> Discriminator {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0_u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

pub fn instruction_discriminator(name: &str) -> Discriminator {
    discriminator("global", name)
}

pub fn account_discriminator() -> Discriminator {
    discriminator("account", ACCOUNT_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct ItemStruct {
    pub(crate) gif_link: String,
    pub(crate) user_address: [u8; 32],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct BaseAccount {
    pub(crate) total_gifs: u64,
    pub(crate) gif_list: Vec<ItemStruct>,
}

impl BaseAccount {
    pub(crate) fn entries(&self) -> Vec<Entry> {
        self.gif_list
            .iter()
            .map(|item| Entry {
                link: item.gif_link.clone(),
                submitter_address: Pubkey::new_from_array(item.user_address).to_string(),
            })
            .collect()
    }
}

/// Arguments of the append instruction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub(crate) struct AddGifArgs {
    pub(crate) gif_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Initialize,
    Append { link: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

pub fn encode_initialize() -> Vec<u8> {
    instruction_discriminator(INITIALIZE_IX).to_vec()
}

pub fn encode_append(link: &str) -> Result<Vec<u8>, CodecError> {
    let args = AddGifArgs {
        gif_link: link.to_owned(),
    };
    let mut data = instruction_discriminator(APPEND_IX).to_vec();
    data.extend(borsh::to_vec(&args).map_err(|err| CodecError(format!("append args: {err}")))?);
    Ok(data)
}

pub fn decode_instruction(data: &[u8]) -> Result<Decoded, CodecError> {
    if data.len() < 8 {
        return Err(CodecError("instruction data shorter than discriminator".to_owned()));
    }
    let (tag, mut args) = data.split_at(8);

    if tag == instruction_discriminator(INITIALIZE_IX) {
        return Ok(Decoded::Initialize);
    }
    if tag == instruction_discriminator(APPEND_IX) {
        let args = AddGifArgs::deserialize(&mut args)
            .map_err(|err| CodecError(format!("append args: {err}")))?;
        return Ok(Decoded::Append { link: args.gif_link });
    }
    Err(CodecError("unknown instruction discriminator".to_owned()))
}

pub(crate) fn decode_base_account(data: &[u8]) -> Result<BaseAccount, CodecError> {
    if data.len() < 8 {
        return Err(CodecError(format!("account data is {} bytes", data.len())));
    }
    let (tag, mut body) = data.split_at(8);
    if tag != account_discriminator() {
        return Err(CodecError("account discriminator mismatch".to_owned()));
    }
    BaseAccount::deserialize(&mut body).map_err(|err| CodecError(format!("account body: {err}")))
}

/// Decodes the entry list in stored (append) order.
pub fn decode_entries(data: &[u8]) -> Result<Vec<Entry>, CodecError> {
    decode_base_account(data).map(|account| account.entries())
}

/// Serializes into a zero-padded buffer of `space` bytes; `None` if it does not fit.
pub(crate) fn encode_base_account(account: &BaseAccount, space: usize) -> Option<Vec<u8>> {
    let mut data = account_discriminator().to_vec();
    data.extend(borsh::to_vec(account).ok()?);
    if data.len() > space {
        return None;
    }
    data.resize(space, 0);
    Some(data)
}
