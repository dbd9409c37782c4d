//! # Smart BMS Pack State
//!
//! Per-pack battery management data. Veteran, Kingsong and Ninebot-Z wheels
//! stream their pack internals in indexed slices (a few cells per frame);
//! the decoder owns a mutable accumulator per pack and snapshots it into the
//! [`WheelState`](crate::telemetry::WheelState) on every emit.

use serde::{Deserialize, Serialize};

use crate::constants::{BMS_MAX_CELLS, BMS_TEMP_SENSORS};

/// State of one battery pack.
///
/// `cell_voltages` is sized by the detected cell count, never beyond 48.
/// The min/max/avg/diff views are derived; call [`SmartBms::recompute`]
/// after any cell-slice update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SmartBms {
    /// Pack voltage, volts
    pub voltage: f64,
    /// Pack current, amps (negative while charging into the pack)
    pub current: f64,
    /// Per-cell voltages, volts
    pub cell_voltages: Vec<f64>,
    /// Detected number of cells
    pub cell_num: usize,
    /// Lowest cell voltage, volts
    pub min_cell: f64,
    /// 1-based index of the lowest cell
    pub min_cell_index: usize,
    /// Highest cell voltage, volts
    pub max_cell: f64,
    /// 1-based index of the highest cell
    pub max_cell_index: usize,
    /// Average cell voltage, volts
    pub avg_cell: f64,
    /// Spread between highest and lowest cell, volts
    pub cell_diff: f64,
    /// Temperature probes, °C
    pub temperatures: [f64; BMS_TEMP_SENSORS],
    /// Remaining capacity, mAh
    pub remaining_capacity: u32,
    /// Factory capacity, mAh
    pub factory_capacity: u32,
    /// Full charge/discharge cycles
    pub full_cycles: u32,
    /// Number of charge sessions
    pub charge_count: u32,
    /// Manufacturing date as reported, e.g. "2021/06/14"
    pub manufacturing_date: String,
    /// Balancer engagement bitmap, one bit per cell
    pub balance_map: u64,
    /// Raw status word
    pub status: u16,
    /// State of charge, percent
    pub soc: u8,
    /// Pack serial number
    pub serial_number: String,
}

impl SmartBms {
    /// Prepare the accumulator for `cells` cells, keeping data already seen.
    pub fn ensure_cells(&mut self, cells: usize) {
        let cells = cells.min(BMS_MAX_CELLS);
        if self.cell_voltages.len() < cells {
            self.cell_voltages.resize(cells, 0.0);
        }
        self.cell_num = self.cell_voltages.len();
    }

    /// Store one cell voltage (0-based index, volts).
    pub fn set_cell(&mut self, index: usize, volts: f64) {
        if index >= BMS_MAX_CELLS {
            return;
        }
        if index >= self.cell_voltages.len() {
            self.cell_voltages.resize(index + 1, 0.0);
        }
        self.cell_voltages[index] = volts;
        self.cell_num = self.cell_voltages.len();
    }

    /// Recompute the min/max/avg/diff views from the stored cells.
    ///
    /// Cells still at 0.0 (slice not yet received) are excluded so a
    /// half-populated pack does not report a 0 V minimum.
    pub fn recompute(&mut self) {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut min_idx = 0usize;
        let mut max_idx = 0usize;
        let mut sum = 0.0;
        let mut seen = 0usize;

        for (i, &v) in self.cell_voltages.iter().enumerate() {
            if v == 0.0 {
                continue;
            }
            seen += 1;
            sum += v;
            if v < min {
                min = v;
                min_idx = i + 1;
            }
            if v > max {
                max = v;
                max_idx = i + 1;
            }
        }

        if seen == 0 {
            self.min_cell = 0.0;
            self.max_cell = 0.0;
            self.min_cell_index = 0;
            self.max_cell_index = 0;
            self.avg_cell = 0.0;
            self.cell_diff = 0.0;
            return;
        }

        self.min_cell = min;
        self.max_cell = max;
        self.min_cell_index = min_idx;
        self.max_cell_index = max_idx;
        self.avg_cell = sum / seen as f64;
        self.cell_diff = max - min;
    }
}
