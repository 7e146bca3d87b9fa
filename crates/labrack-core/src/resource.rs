//! Resource identifiers and the generator rate table.
//!
//! A [`Generator`] is the rate registration an installed rack hands to its
//! lab. The host evaluates it once per physics tick and records how much of
//! each resource actually flowed; this crate only builds, registers,
//! withdraws and reads it.
//!
//! Sign convention: a negative ratio or flow means the resource is produced,
//! a positive one means it is consumed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LAB_TIME: &str = "LabTime";
pub const KEMINI_LAB_TIME: &str = "KeminiLabTime";
pub const ELECTRIC_CHARGE: &str = "ElectricCharge";
pub const EXPOSURE_TIME: &str = "ExposureTime";

/// A produced flow must be below `-RUNNING_THRESHOLD` for the producer to
/// count as running.
pub const RUNNING_THRESHOLD: f64 = 0.000_000_1;

/// One resource entry in a generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Units per hour (negative = produced) or units per produced unit.
    pub ratio: f64,
    /// Flow recorded by the host on the last evaluation.
    pub last_produced: f64,
}

/// Resource-rate table registered with a lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    rates: BTreeMap<String, Rate>,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator converting `reactant` into `product`.
    ///
    /// The reactant entry is only added when `reactant_per_product` is
    /// positive; free production consumes nothing.
    pub fn conversion(
        product: &str,
        product_per_hour: f64,
        reactant: &str,
        reactant_per_product: f64,
    ) -> Self {
        let mut generator = Self::new();
        generator.add_rate(product, -product_per_hour);
        if reactant_per_product > 0.0 {
            generator.add_rate(reactant, reactant_per_product);
        }
        generator
    }

    /// Add or replace the rate for `resource`. Resets its recorded flow.
    pub fn add_rate(&mut self, resource: &str, ratio: f64) {
        self.rates.insert(
            resource.to_string(),
            Rate {
                ratio,
                last_produced: 0.0,
            },
        );
    }

    pub fn rate(&self, resource: &str) -> Option<&Rate> {
        self.rates.get(resource)
    }

    /// Flow of `resource` on the last evaluation, 0.0 if unknown.
    pub fn last_produced(&self, resource: &str) -> f64 {
        self.rates.get(resource).map_or(0.0, |r| r.last_produced)
    }

    /// Host side: record the flow of `resource` from the latest evaluation.
    /// Returns `false` if this generator has no entry for it.
    pub fn record_produced(&mut self, resource: &str, amount: f64) -> bool {
        match self.rates.get_mut(resource) {
            Some(rate) => {
                rate.last_produced = amount;
                true
            }
            None => false,
        }
    }

    /// Whether the last evaluation produced `resource`.
    pub fn is_producing(&self, resource: &str) -> bool {
        self.last_produced(resource) < -RUNNING_THRESHOLD
    }

    pub fn rates(&self) -> impl Iterator<Item = (&str, &Rate)> {
        self.rates.iter().map(|(name, rate)| (name.as_str(), rate))
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
