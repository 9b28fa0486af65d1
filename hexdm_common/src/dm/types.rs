//! Deformable mirror data types.
//!
//! - `SegmentPtt` - piston/tip/tilt of one segment
//! - `ActuatorCommand` - fixed-length drive array handed to the driver
//! - `ActuatorMap` - command index to driver address lookup table

use serde::{Deserialize, Serialize};

use crate::consts::NDOF;
use crate::dm::driver::DriverError;

/// Piston/tip/tilt command of a single segment.
///
/// Piston is in nanometers, tip and tilt in milliradians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentPtt {
    /// Piston [nm]
    pub piston: f64,
    /// Tip [mrad]
    pub tip: f64,
    /// Tilt [mrad]
    pub tilt: f64,
}

impl SegmentPtt {
    /// Create a new segment command.
    pub const fn new(piston: f64, tip: f64, tilt: f64) -> Self {
        Self { piston, tip, tilt }
    }

    /// Read segment `index` out of a flat `[p, t, l, p, t, l, ...]` buffer.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn from_flat(flat: &[f64], index: usize) -> Option<Self> {
        let base = index * NDOF;
        let dof = flat.get(base..base + NDOF)?;
        Some(Self::new(dof[0], dof[1], dof[2]))
    }

    /// Store this command as segment `index` of a flat buffer.
    ///
    /// Returns `false` (and leaves the buffer untouched) if out of range.
    pub fn write_flat(&self, flat: &mut [f64], index: usize) -> bool {
        let base = index * NDOF;
        match flat.get_mut(base..base + NDOF) {
            Some(dof) => {
                dof.copy_from_slice(&[self.piston, self.tip, self.tilt]);
                true
            }
            None => false,
        }
    }
}

/// Drive values for the mirror driver.
///
/// Always `size` long; only the first `active` entries carry segment
/// commands, the tail stays at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    values: Vec<f64>,
    active: usize,
}

impl ActuatorCommand {
    /// Create an all-zero command of `size` values with `active` meaningful ones.
    pub fn zeroed(size: usize, active: usize) -> Self {
        Self {
            values: vec![0.0; size],
            active: active.min(size),
        }
    }

    /// Full command array, including the neutral tail.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the full command array.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// The meaningful prefix (`ndof * nseg` values).
    pub fn active(&self) -> &[f64] {
        &self.values[..self.active]
    }

    /// Number of meaningful values.
    pub fn active_len(&self) -> usize {
        self.active
    }

    /// Total command length.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the command holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Actuator lookup table: command index `i` drives driver address `lut[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorMap {
    lut: Vec<u32>,
}

impl ActuatorMap {
    /// One-to-one mapping of `size` actuators.
    pub fn identity(size: usize) -> Self {
        Self {
            lut: (0..size as u32).collect(),
        }
    }

    /// Build a map from a raw lookup table.
    ///
    /// Every address must be smaller than `address_space`.
    pub fn from_lut(lut: Vec<u32>, address_space: usize) -> Result<Self, DriverError> {
        if let Some((idx, addr)) = lut
            .iter()
            .enumerate()
            .find(|(_, addr)| **addr as usize >= address_space)
        {
            return Err(DriverError::InvalidMap(format!(
                "entry {idx} maps to address {addr} outside 0..{address_space}"
            )));
        }
        Ok(Self { lut })
    }

    /// Driver address of command index `index`.
    pub fn address(&self, index: usize) -> Option<usize> {
        self.lut.get(index).map(|a| *a as usize)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lut.len()
    }

    /// True when the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lut.is_empty()
    }

    /// Scatter `command` into driver address order.
    ///
    /// `out[lut[i]] = command[i]` for every mapped index; addresses without
    /// a mapped command keep their previous value.
    pub fn scatter(&self, command: &ActuatorCommand, out: &mut [f64]) -> Result<(), DriverError> {
        if command.len() > self.lut.len() {
            return Err(DriverError::InvalidMap(format!(
                "command has {} values, map only {}",
                command.len(),
                self.lut.len()
            )));
        }
        for (value, addr) in command.values().iter().zip(&self.lut) {
            let slot = out.get_mut(*addr as usize).ok_or_else(|| {
                DriverError::InvalidMap(format!("address {addr} outside driver array"))
            })?;
            *slot = *value;
        }
        Ok(())
    }
}
