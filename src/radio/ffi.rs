//! C ABI over a process-wide [`ChainRegistry`].
//!
//! Handles are non-zero `u64`s. Functions returning `i32` return the
//! [`ErrorCode`] of the call, 0 on success. The same code and its message
//! stay queryable through `radiofx_get_last_error*` until the next call on
//! that handle. Handle 0 addresses the registry itself, which remembers the
//! last failed construction, destroy or lookup.

use std::ffi::c_char;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use crate::radio::chain::ProcessingChain;
use crate::radio::error::{ChainError, ChainResult, ErrorCode};
use crate::radio::registry::{ChainHandle, ChainRegistry};
use crate::radio::stages::compressor::{CompressorParams, CompressorStyle};
use crate::radio::stages::equalizer::EqBand;
use crate::radio::stages::filter::FilterType;
use crate::radio::stages::saturator::{SaturatorParams, SaturatorStyle};

static REGISTRY: LazyLock<Mutex<ChainRegistry>> =
    LazyLock::new(|| Mutex::new(ChainRegistry::new()));

fn registry() -> MutexGuard<'static, ChainRegistry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status(result: &ChainResult<()>) -> i32 {
    result
        .as_ref()
        .map_or_else(|e| e.code().as_i32(), |_| ErrorCode::None.as_i32())
}

/// Run `op` on the chain behind `handle`, reporting a lookup failure as-is.
///
/// Argument decoding can fail before any chain method runs, so every failure
/// is written back to the chain's error state here.
fn with_chain(handle: u64, op: impl FnOnce(&mut ProcessingChain) -> ChainResult<()>) -> i32 {
    let mut registry = registry();
    let chain = match registry.get_raw_mut(handle) {
        Ok(chain) => chain,
        Err(e) => return e.code().as_i32(),
    };
    let result = op(&mut *chain);
    if let Err(e) = &result {
        chain.record_error(e.clone());
    }
    status(&result)
}

/// Create a chain. Returns 0 on failure; the reason is readable via handle 0.
#[unsafe(no_mangle)]
pub extern "C" fn radiofx_create_chain(sample_rate: f64, max_block_size: i32) -> u64 {
    let mut registry = registry();
    let result = match usize::try_from(max_block_size) {
        Ok(size) => registry.create(sample_rate, size),
        Err(_) => {
            // Route through create so the registry records the failure.
            registry.create(sample_rate, 0)
        }
    };
    result.map_or(0, ChainHandle::to_raw)
}

#[unsafe(no_mangle)]
pub extern "C" fn radiofx_destroy_chain(handle: u64) -> i32 {
    let mut registry = registry();
    let result = match ChainHandle::from_raw(handle) {
        Some(h) => registry.destroy(h),
        None => registry.get_raw_mut(handle).map(|_| ()),
    };
    status(&result)
}

/// Process `count` samples in place.
///
/// # Safety
///
/// `samples` must be valid for reads and writes of `count` `f32`s, or null
/// with `count` 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn radiofx_process_block(handle: u64, samples: *mut f32, count: i32) -> i32 {
    with_chain(handle, |chain| {
        let Ok(len) = usize::try_from(count) else {
            return Err(ChainError::invalid_parameter(format!(
                "sample count {count} is negative"
            )));
        };
        if len == 0 {
            return chain.process_block(&mut []);
        }
        if samples.is_null() {
            return Err(ChainError::invalid_parameter("sample pointer is null"));
        }
        // SAFETY: the caller guarantees `samples` covers `count` floats.
        let block = unsafe { std::slice::from_raw_parts_mut(samples, len) };
        chain.process_block(block)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn radiofx_add_eq_band(
    handle: u64,
    frequency: f32,
    gain_db: f32,
    q: f32,
    filter_type: i32,
    enabled: bool,
    slope: i32,
) -> i32 {
    with_chain(handle, |chain| {
        let filter_type = FilterType::from_code(filter_type)?;
        let mut band = EqBand::new(filter_type, frequency, gain_db, q).with_slope(slope);
        band.enabled = enabled;
        chain.add_eq_band(band).map(|_| ())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn radiofx_clear_eq_bands(handle: u64) -> i32 {
    with_chain(handle, |chain| {
        chain.clear_eq_bands();
        Ok(())
    })
}

/// Clear filter, envelope and oversampler history without touching parameters.
#[unsafe(no_mangle)]
pub extern "C" fn radiofx_reset_chain(handle: u64) -> i32 {
    with_chain(handle, |chain| {
        chain.reset();
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn radiofx_configure_eq(
    handle: u64,
    output_gain_db: f32,
    analyzer_enabled: bool,
    quality: i32,
) -> i32 {
    with_chain(handle, |chain| {
        chain.configure_eq(output_gain_db, analyzer_enabled, quality)
    })
}

#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn radiofx_set_compressor(
    handle: u64,
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    knee_db: f32,
    makeup_db: f32,
    style: i32,
    auto_gain: bool,
    dry_mix: f32,
) -> i32 {
    with_chain(handle, |chain| {
        let style = CompressorStyle::from_code(style)?;
        chain.set_compressor(CompressorParams {
            threshold_db,
            ratio,
            attack_ms,
            release_ms,
            knee_db,
            makeup_db,
            style,
            auto_gain,
            dry_mix,
        })
    })
}

/// Peak reduction of the last block in dB (0 or negative). Returns 0 for
/// an unknown handle.
#[unsafe(no_mangle)]
pub extern "C" fn radiofx_get_compressor_gain_reduction(handle: u64) -> f32 {
    let mut registry = registry();
    registry
        .get_raw_mut(handle)
        .map_or(0.0, |chain| chain.compressor_gain_reduction())
}

#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn radiofx_set_saturator(
    handle: u64,
    drive: f32,
    low_cut_hz: f32,
    high_cut_hz: f32,
    tone: f32,
    mix: f32,
    punish: bool,
    style: i32,
    output_db: f32,
    oversampling: bool,
    static_volume: f32,
) -> i32 {
    with_chain(handle, |chain| {
        let style = SaturatorStyle::from_code(style)?;
        chain.set_saturator(SaturatorParams {
            drive,
            low_cut_hz,
            high_cut_hz,
            tone,
            mix,
            punish,
            style,
            output_db,
            oversampling,
            static_volume,
        })
    })
}

/// # Safety
///
/// `order` must point to three readable `i32`s.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn radiofx_configure_chain(
    handle: u64,
    eq_enabled: bool,
    comp_enabled: bool,
    sat_enabled: bool,
    order: *const i32,
) -> i32 {
    with_chain(handle, |chain| {
        if order.is_null() {
            return Err(ChainError::invalid_parameter("order pointer is null"));
        }
        // SAFETY: the caller guarantees three readable elements.
        let order = unsafe { [*order, *order.add(1), *order.add(2)] };
        chain.configure_chain(eq_enabled, comp_enabled, sat_enabled, order)
    })
}

/// Error code of the last call on `handle`, or of the registry for handle 0.
#[unsafe(no_mangle)]
pub extern "C" fn radiofx_get_last_error(handle: u64) -> i32 {
    last_error_of(handle, |err| err.map_or(ErrorCode::None, ChainError::code).as_i32())
}

/// Copy the last error message for `handle` into `buffer` as a NUL-terminated
/// string, truncating to fit. Returns the full message length in bytes.
///
/// # Safety
///
/// `buffer` must be valid for writes of `capacity` bytes, or null with
/// `capacity` 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn radiofx_get_last_error_message(
    handle: u64,
    buffer: *mut c_char,
    capacity: usize,
) -> usize {
    let message = last_error_of(handle, |err| {
        err.map(|e| e.message().to_owned()).unwrap_or_default()
    });
    if !buffer.is_null() && capacity > 0 {
        let copied = message.len().min(capacity - 1);
        // SAFETY: `copied + 1 <= capacity` bytes are writable per the contract.
        unsafe {
            std::ptr::copy_nonoverlapping(message.as_ptr().cast::<c_char>(), buffer, copied);
            *buffer.add(copied) = 0;
        }
    }
    message.len()
}

fn last_error_of<T>(handle: u64, read: impl FnOnce(Option<&ChainError>) -> T) -> T {
    let mut registry = registry();
    if handle == 0 {
        return read(registry.last_error());
    }
    match registry.get_raw_mut(handle) {
        Ok(chain) => read(chain.last_error()),
        Err(e) => read(Some(&e)),
    }
}
