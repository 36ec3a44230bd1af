// src/chemistry.rs
//
// =============================================================================
// LABTWIN: CHEMICAL CONTENT (v 0.3 )
// =============================================================================
//
// Conservation arithmetic for anything that touches reaction chemicals.
//
// Model: content is a homogeneous liquid (or well-mixed powder). Withdrawing
// an amount A from a total T removes A/T of every chemical, so the relative
// composition never changes.

use crate::error::ContentError;
use crate::lab::Lab;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quantities below this are treated as rounding noise.
pub const CONTENT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChemicalContent {
    amounts: BTreeMap<String, f64>,
}

impl ChemicalContent {
    pub fn new(amounts: BTreeMap<String, f64>) -> Result<Self, ContentError> {
        let mut c = Self::default();
        c.add_content(&amounts)?;
        Ok(c)
    }

    pub fn chemical_content(&self) -> &BTreeMap<String, f64> {
        &self.amounts
    }

    pub fn amount_of(&self, chemical: &str) -> f64 {
        self.amounts.get(chemical).copied().unwrap_or(0.0)
    }

    pub fn content_sum(&self) -> f64 {
        self.amounts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.content_sum() <= CONTENT_EPSILON
    }

    /// Adds to existing entries, inserts new ones. All amounts are checked
    /// before any is applied.
    pub fn add_content(&mut self, content: &BTreeMap<String, f64>) -> Result<(), ContentError> {
        for v in content.values() {
            check_amount(*v)?;
        }
        for (k, v) in content {
            *self.amounts.entry(k.clone()).or_insert(0.0) += *v;
        }
        Ok(())
    }

    /// Withdraws `amount` proportionally and returns what was removed.
    pub fn remove_content(&mut self, amount: f64) -> Result<BTreeMap<String, f64>, ContentError> {
        check_amount(amount)?;
        let total = self.content_sum();
        if total <= CONTENT_EPSILON {
            return Err(ContentError::DivisionByZero { requested: amount });
        }
        if amount > total + CONTENT_EPSILON {
            return Err(ContentError::InsufficientContent {
                requested: amount,
                available: total,
            });
        }

        let pct = (amount / total).min(1.0);
        let mut removed = BTreeMap::new();
        for (k, v) in self.amounts.iter_mut() {
            let r = *v * pct;
            *v = (*v - r).max(0.0);
            removed.insert(k.clone(), r);
        }
        Ok(removed)
    }

    /// Replaces the whole content. Used by setup code and the mage device.
    pub fn set_content(&mut self, content: BTreeMap<String, f64>) {
        self.amounts = content
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k, v.max(0.0)))
            .collect();
    }

    pub fn clear(&mut self) -> BTreeMap<String, f64> {
        std::mem::take(&mut self.amounts)
    }
}

fn check_amount(v: f64) -> Result<(), ContentError> {
    if !v.is_finite() || v < 0.0 {
        return Err(ContentError::InvalidAmount(v));
    }
    Ok(())
}

// ============================================================================
// REGISTRY-LEVEL OPERATIONS
// ============================================================================

impl Lab {
    pub fn content_of(&self, id: &str) -> Result<&ChemicalContent, ContentError> {
        self.get(id)?
            .content()
            .ok_or_else(|| ContentError::NotAChemicalContainer(id.to_string()))
    }

    pub(crate) fn content_mut(&mut self, id: &str) -> Result<&mut ChemicalContent, ContentError> {
        let obj = self.get_mut(id)?;
        obj.content
            .as_mut()
            .ok_or_else(|| ContentError::NotAChemicalContainer(id.to_string()))
    }

    pub fn add_content(
        &mut self,
        id: &str,
        content: &BTreeMap<String, f64>,
    ) -> Result<(), ContentError> {
        self.content_mut(id)?.add_content(content)
    }

    pub fn remove_content(
        &mut self,
        id: &str,
        amount: f64,
    ) -> Result<BTreeMap<String, f64>, ContentError> {
        self.content_mut(id)?.remove_content(amount)
    }

    /// Moves `amount` from `source` into `dest`, all or nothing.
    pub fn transfer_content(
        &mut self,
        source: &str,
        dest: &str,
        amount: f64,
    ) -> Result<BTreeMap<String, f64>, ContentError> {
        // Both ends must exist before the source is touched.
        self.content_of(dest)?;
        let removed = self.content_mut(source)?.remove_content(amount)?;
        self.content_mut(dest)?.add_content(&removed)?;
        log::debug!("transferred {:.3} from {} to {}", amount, source, dest);
        Ok(removed)
    }
}
