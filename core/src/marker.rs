//! Persisted fail-safe marker: codec and store.
//!
//! # Record layout
//!
//! ```text
//! 15          anonymous structure
//! 24 00 NN    context tag 0: fabric index (uint8)
//! 18          end of structure
//! ```
//!
//! # Forward compatibility
//!
//! The size budget reserves room for two more 8-byte fields that no current
//! writer emits. Decoding reads the fabric index and stops; it never walks
//! to the end of the structure, so records from a newer schema that append
//! fields after the fabric index still decode here. New fields must
//! therefore always go after tag 0.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use failsafe_storage::PersistentStorage;
use failsafe_types::{FabricIndex, Marker};
use tracing::{debug, error};

use crate::error::FailSafeError;
use crate::tlv::{ElementType, Tag, TlvError, TlvReader, TlvWriter, estimate_struct_overhead};

/// Storage key of the marker record.
pub const FAIL_SAFE_MARKER_KEY: &str = "g/fs/m";

const FABRIC_INDEX_TAG: Tag = Tag::Context(0);

/// Reserved size of an encoded marker: the fabric index plus two future
/// `u64` fields.
pub const MARKER_MAX_ENCODED_LEN: usize =
    estimate_struct_overhead(&[size_of::<u8>(), size_of::<u64>(), size_of::<u64>()]);

pub fn encode_marker(marker: &Marker) -> Result<Vec<u8>, FailSafeError> {
    let mut buf = [0u8; MARKER_MAX_ENCODED_LEN];
    let mut writer = TlvWriter::new(&mut buf);
    write_record(&mut writer, marker).map_err(|err| match err {
        TlvError::BufferTooSmall { needed, capacity } => {
            FailSafeError::BufferTooSmall { needed, capacity }
        }
        other => FailSafeError::Codec(other),
    })?;

    let encoded = writer.finish()?;
    // Stores report value lengths in 16 bits.
    if u16::try_from(encoded.len()).is_err() {
        return Err(FailSafeError::BufferTooSmall {
            needed: encoded.len(),
            capacity: usize::from(u16::MAX),
        });
    }
    Ok(encoded.to_vec())
}

fn write_record(writer: &mut TlvWriter<'_>, marker: &Marker) -> Result<(), TlvError> {
    writer.start_container(Tag::Anonymous, ElementType::Structure)?;
    writer.put_u8(FABRIC_INDEX_TAG, marker.fabric_index.value())?;
    writer.end_container()
}

pub fn decode_marker(bytes: &[u8]) -> Result<Marker, FailSafeError> {
    let mut reader = TlvReader::new(bytes);
    let outer = reader.next()?.ok_or(TlvError::UnexpectedEnd)?;
    outer
        .expect_tag(Tag::Anonymous)?
        .expect_type(ElementType::Structure)?;
    reader.enter_container()?;

    let field = reader.next()?.ok_or(TlvError::UnexpectedEnd)?;
    let fabric_index = field.expect_tag(FABRIC_INDEX_TAG)?.get_u8()?;

    // The rest of the structure is left unread: see module docs.
    Ok(Marker::new(FabricIndex::new(fabric_index)))
}

/// Load/save/erase of the marker on an injected store.
#[derive(Default)]
pub struct MarkerStore {
    storage: Option<Arc<dyn PersistentStorage>>,
}

impl fmt::Debug for MarkerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerStore")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl MarkerStore {
    /// A store with no backing storage yet. Every operation but
    /// [`MarkerStore::set_storage`] fails until one is supplied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_storage(storage: Arc<dyn PersistentStorage>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    pub fn set_storage(&mut self, storage: Arc<dyn PersistentStorage>) {
        self.storage = Some(storage);
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.storage.is_some()
    }

    /// Read the marker. `Ok(None)` means none is persisted, which is the
    /// normal case.
    pub fn load(&self) -> Result<Option<Marker>, FailSafeError> {
        let storage = self.storage()?;
        let bytes = match storage.get(FAIL_SAFE_MARKER_KEY) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.len() > MARKER_MAX_ENCODED_LEN {
            return Err(FailSafeError::BufferTooSmall {
                needed: bytes.len(),
                capacity: MARKER_MAX_ENCODED_LEN,
            });
        }
        decode_marker(&bytes).map(Some)
    }

    pub fn save(&self, marker: &Marker) -> Result<(), FailSafeError> {
        let storage = self.storage()?;
        let encoded = encode_marker(marker)?;
        storage.set(FAIL_SAFE_MARKER_KEY, &encoded)?;
        debug!(fabric_index = %marker.fabric_index, "Fail-safe marker stored");
        Ok(())
    }

    /// Delete the marker. Failures are logged, not returned.
    ///
    /// # Panics
    ///
    /// If no storage has been supplied. Callers establish that at
    /// construction, so reaching here without it is a wiring bug.
    pub fn erase(&self) {
        let Some(storage) = self.storage.as_ref() else {
            panic!("fail-safe marker erased before storage was supplied");
        };
        match storage.delete(FAIL_SAFE_MARKER_KEY) {
            Ok(()) => debug!("Fail-safe marker erased"),
            Err(err) if err.is_not_found() => debug!("No fail-safe marker to erase"),
            Err(err) => error!("Failed to erase fail-safe marker: {err}"),
        }
    }

    fn storage(&self) -> Result<&Arc<dyn PersistentStorage>, FailSafeError> {
        self.storage
            .as_ref()
            .ok_or(FailSafeError::IncorrectState("marker storage not initialized"))
    }
}
