use log::debug;

use crate::radio::chain::ProcessingChain;
use crate::radio::error::{ChainError, ChainResult, ErrorCode};

/// Opaque reference to a chain owned by a [`ChainRegistry`].
///
/// A handle stays distinguishable after its chain is destroyed, so stale
/// handles are reported instead of silently reaching a newer chain that
/// reuses the slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChainHandle {
    index: u32,
    generation: u32,
}

impl ChainHandle {
    /// Pack into a non-zero integer for the C ABI.
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64 + 1)
    }

    /// Inverse of [`ChainHandle::to_raw`]. Zero never decodes.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        let low = (raw & 0xFFFF_FFFF) as u32;
        if low == 0 {
            return None;
        }
        Some(Self {
            index: low - 1,
            generation: (raw >> 32) as u32,
        })
    }
}

struct Slot {
    generation: u32,
    chain: Option<ProcessingChain>,
}

/// Generation-checked slot map of live chains.
#[derive(Default)]
pub struct ChainRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    last_error: Option<ChainError>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record<T>(&mut self, result: ChainResult<T>) -> ChainResult<T> {
        self.last_error = result.as_ref().err().cloned();
        result
    }

    pub fn create(&mut self, sample_rate: f64, max_block_size: usize) -> ChainResult<ChainHandle> {
        let result = ProcessingChain::new(sample_rate, max_block_size).and_then(|chain| {
            let handle = self.insert(chain)?;
            debug!("Chain {handle:?} registered");
            Ok(handle)
        });
        self.record(result)
    }

    fn insert(&mut self, chain: ProcessingChain) -> ChainResult<ChainHandle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1).max(1);
            slot.chain = Some(chain);
            return Ok(ChainHandle {
                index,
                generation: slot.generation,
            });
        }

        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|&i| i < u32::MAX)
            .ok_or_else(|| ChainError::construction("chain registry is full"))?;
        self.slots.push(Slot {
            generation: 1,
            chain: Some(chain),
        });
        Ok(ChainHandle {
            index,
            generation: 1,
        })
    }

    /// Destroy the chain behind `handle`. A second destroy reports `Released`.
    pub fn destroy(&mut self, handle: ChainHandle) -> ChainResult<()> {
        let result = self.slot_mut(handle).map(|slot| {
            slot.chain = None;
        });
        if result.is_ok() {
            self.free.push(handle.index);
            debug!("Chain {handle:?} destroyed");
        }
        self.record(result)
    }

    fn slot_mut(&mut self, handle: ChainHandle) -> ChainResult<&mut Slot> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or_else(|| invalid_handle(handle))?;
        match (slot.generation.cmp(&handle.generation), &slot.chain) {
            (std::cmp::Ordering::Equal, Some(_)) => Ok(slot),
            (std::cmp::Ordering::Equal, None) | (std::cmp::Ordering::Greater, _) => {
                Err(ChainError::released())
            }
            (std::cmp::Ordering::Less, _) => Err(invalid_handle(handle)),
        }
    }

    /// Look up a live chain. Lookup failures are recorded as the registry error.
    pub fn get_mut(&mut self, handle: ChainHandle) -> ChainResult<&mut ProcessingChain> {
        match self.slot_mut(handle) {
            Ok(_) => {}
            Err(e) => return self.record(Err(e)),
        }
        self.slots[handle.index as usize]
            .chain
            .as_mut()
            .ok_or_else(ChainError::released)
    }

    pub fn get(&self, handle: ChainHandle) -> ChainResult<&ProcessingChain> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or_else(|| invalid_handle(handle))?;
        if slot.generation < handle.generation {
            return Err(invalid_handle(handle));
        }
        match &slot.chain {
            Some(chain) if slot.generation == handle.generation => Ok(chain),
            _ => Err(ChainError::released()),
        }
    }

    /// Decode a raw C handle and look it up.
    pub fn get_raw_mut(&mut self, raw: u64) -> ChainResult<&mut ProcessingChain> {
        match ChainHandle::from_raw(raw) {
            Some(handle) => self.get_mut(handle),
            None => self.record(Err(ChainError::new(
                ErrorCode::InvalidHandle,
                "handle 0 does not name a chain",
            ))),
        }
    }

    /// Failure of the last create, destroy or failed lookup.
    pub const fn last_error(&self) -> Option<&ChainError> {
        self.last_error.as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.chain.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invalid_handle(handle: ChainHandle) -> ChainError {
    ChainError::new(
        ErrorCode::InvalidHandle,
        format!("{handle:?} was never issued by this registry"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_handles_round_trip_and_zero_is_rejected() {
        let handle = ChainHandle {
            index: 7,
            generation: 3,
        };
        assert_ne!(handle.to_raw(), 0);
        assert_eq!(ChainHandle::from_raw(handle.to_raw()), Some(handle));
        assert_eq!(ChainHandle::from_raw(0), None);
    }

    #[test]
    fn destroyed_handle_reports_released() {
        let mut registry = ChainRegistry::new();
        let handle = registry.create(48_000.0, 512).unwrap();
        registry.destroy(handle).unwrap();

        assert_eq!(
            registry.get_mut(handle).err().unwrap().code(),
            ErrorCode::Released
        );
        assert_eq!(
            registry.destroy(handle).unwrap_err().code(),
            ErrorCode::Released
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn reused_slot_does_not_revive_stale_handle() {
        let mut registry = ChainRegistry::new();
        let old = registry.create(48_000.0, 512).unwrap();
        registry.destroy(old).unwrap();
        let new = registry.create(44_100.0, 256).unwrap();

        assert_ne!(old, new);
        assert_eq!(registry.get(old).err().unwrap().code(), ErrorCode::Released);
        assert_eq!(registry.get(new).unwrap().sample_rate(), 44_100.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_construction_is_recorded() {
        let mut registry = ChainRegistry::new();
        assert!(registry.create(0.0, 512).is_err());
        assert_eq!(
            registry.last_error().unwrap().code(),
            ErrorCode::InvalidConstruction
        );
        assert!(registry.is_empty());

        registry.create(48_000.0, 512).unwrap();
        assert!(registry.last_error().is_none());
    }

    #[test]
    fn unknown_handles_are_invalid() {
        let mut registry = ChainRegistry::new();
        let bogus = ChainHandle {
            index: 4,
            generation: 1,
        };
        assert_eq!(
            registry.get_mut(bogus).err().unwrap().code(),
            ErrorCode::InvalidHandle
        );
        assert_eq!(
            registry.get_raw_mut(0).err().unwrap().code(),
            ErrorCode::InvalidHandle
        );
    }
}
