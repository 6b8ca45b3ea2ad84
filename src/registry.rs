//! Cached feature values and descriptors of one camera.

use std::collections::HashMap;

use crate::descriptor::FeatureDescriptor;
use crate::driver::{CameraHandle, Driver};
use crate::sys::CAM_FEA_CAPACITY;
use crate::types::{FeatureId, VariantType};
use crate::variant::{decode, encode_variant, FeatureValue, FeatureVector, Value};
use crate::{DsCamError, Result};

/// Last observed value of every feature the camera reported.
pub type FeatureSnapshot = HashMap<FeatureId, FeatureValue>;

/// Feature cache in front of the driver.
///
/// Reads are served from the snapshot taken by the last [`refresh`](Self::refresh);
/// nothing is read from the device implicitly. Single writes re-query the
/// device afterwards, batch writes update the cache with the requested
/// values.
pub struct FeatureRegistry {
    handle: CameraHandle,
    snapshot: FeatureSnapshot,
    descriptors: HashMap<FeatureId, FeatureDescriptor>,
}

impl FeatureRegistry {
    pub fn new(handle: CameraHandle) -> Self {
        Self {
            handle,
            snapshot: HashMap::new(),
            descriptors: HashMap::new(),
        }
    }

    /// Replace snapshot and descriptors with the device's current state.
    pub fn refresh<D: Driver + ?Sized>(&mut self, driver: &D) -> Result<()> {
        let snapshot = self.query(driver)?;
        let mut descriptors = HashMap::new();
        for &id in snapshot.keys() {
            if let Some(desc) = driver.get_feature_desc(self.handle, id)? {
                descriptors.insert(id, desc);
            }
        }
        log::debug!(
            "Refreshed {} features, {} descriptors",
            snapshot.len(),
            descriptors.len()
        );
        self.snapshot = snapshot;
        self.descriptors = descriptors;
        Ok(())
    }

    fn query<D: Driver + ?Sized>(&self, driver: &D) -> Result<FeatureSnapshot> {
        let mut features = FeatureVector::with_capacity(CAM_FEA_CAPACITY);
        driver.get_all_features(self.handle, &mut features)?;
        Ok(features.values().map(|v| (v.id, v)).collect())
    }

    pub fn snapshot(&self) -> &FeatureSnapshot {
        &self.snapshot
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.snapshot.contains_key(&id)
    }

    /// Supported feature ids in ascending order.
    pub fn ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<_> = self.snapshot.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn descriptor(&self, id: FeatureId) -> Option<&FeatureDescriptor> {
        self.descriptors.get(&id)
    }

    pub fn get(&self, id: FeatureId) -> Result<Value> {
        let entry = self
            .snapshot
            .get(&id)
            .ok_or(DsCamError::FeatureNotAvailable(id))?;
        decode(entry)
    }

    /// Encode `value` for `id` and check it against the descriptor.
    fn prepare(&self, id: FeatureId, value: &Value) -> Result<FeatureValue> {
        let current = self
            .snapshot
            .get(&id)
            .ok_or(DsCamError::FeatureNotAvailable(id))?;
        // Uncatalogued features are written with the type the device reported.
        let ty = match id.variant_type() {
            VariantType::Unknown => current
                .value
                .variant_type()
                .unwrap_or(VariantType::Unknown),
            ty => ty,
        };
        let variant = encode_variant(id, ty, value)?;
        if let Some(desc) = self.descriptors.get(&id) {
            if !desc.validate(&variant) {
                return Err(DsCamError::OutOfRange(id));
            }
        }
        Ok(FeatureValue {
            id,
            value: variant,
            trans_size: current.trans_size,
        })
    }

    /// Write one feature and cache the value the device reports back.
    ///
    /// Returns the confirmed value, which may differ from `value` when the
    /// device clamps or rounds. On failure the cache is untouched.
    pub fn set<D: Driver + ?Sized>(
        &mut self,
        driver: &D,
        id: FeatureId,
        value: &Value,
    ) -> Result<Value> {
        let entry = self.prepare(id, value)?;
        let mut request = FeatureVector::from_values(std::slice::from_ref(&entry))?;
        driver.set_features(self.handle, &mut request)?;

        let mut current = self.query(driver)?;
        let confirmed = match current.remove(&id) {
            Some(confirmed) => confirmed,
            None => {
                log::warn!(
                    "Feature {} missing from the device after write, caching requested value",
                    id
                );
                entry
            }
        };
        self.snapshot.insert(id, confirmed);
        let confirmed = self.get(id)?;
        log::info!("Set {} to {:?}, device reports {:?}", id, value, confirmed);
        Ok(confirmed)
    }

    /// Write several features in one transaction.
    ///
    /// The cache takes the requested values without re-querying the device.
    /// Nothing is written if any value fails encoding or validation.
    pub fn set_many<D: Driver + ?Sized>(
        &mut self,
        driver: &D,
        values: &[(FeatureId, Value)],
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        if values.len() > CAM_FEA_CAPACITY {
            return Err(DsCamError::CapacityExceeded {
                count: values.len(),
                capacity: CAM_FEA_CAPACITY,
            });
        }
        let entries = values
            .iter()
            .map(|(id, value)| self.prepare(*id, value))
            .collect::<Result<Vec<_>>>()?;
        let mut request = FeatureVector::from_values(&entries)?;
        driver.set_features(self.handle, &mut request)?;

        log::info!("Set {} features in one transaction", entries.len());
        for entry in entries {
            self.snapshot.insert(entry.id, entry);
        }
        Ok(())
    }
}
