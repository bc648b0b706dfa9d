//! Per-event metadata records written alongside each image.
//!
//! An [`InfoExtractor`] turns an event into an ordered list of named
//! scalars. [`McInfoMaker`] wraps an extractor, appends the production
//! identifier and enforces one schema for the whole run.

use std::fmt;
use std::str::FromStr;

use hitbin_core::{Error, Event, Result};

/// Field name of the injected production identifier.
pub const PROD_IDENT_FIELD: &str = "prod_ident";

/// Ordered named scalar fields of one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoRecord {
    names: Vec<String>,
    values: Vec<f64>,
}

impl InfoRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: f64) {
        self.names.push(name.to_string());
        self.values.push(value);
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of field `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}

/// Strategy extracting metadata from an event.
pub trait InfoExtractor {
    /// Builds the record for `event`.
    ///
    /// # Errors
    /// Returns a configuration error if the event lacks what the schema needs.
    fn extract(&self, event: &Event) -> Result<InfoRecord>;
}

impl<F> InfoExtractor for F
where
    F: Fn(&Event) -> Result<InfoRecord>,
{
    fn extract(&self, event: &Event) -> Result<InfoRecord> {
        self(event)
    }
}

/// Extractors selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinExtractor {
    /// MC neutrino truth.
    Neutrino,
    /// Measured data: event header only.
    RealData,
    /// Pure noise simulation.
    RandomNoise,
}

impl BuiltinExtractor {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Neutrino => "neutrino",
            Self::RealData => "real_data",
            Self::RandomNoise => "random_noise",
        }
    }
}

impl FromStr for BuiltinExtractor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "neutrino" => Ok(Self::Neutrino),
            "real_data" => Ok(Self::RealData),
            "random_noise" => Ok(Self::RandomNoise),
            "mupage" => Err(Error::config(
                "the mupage extractor needs every muon track and per-hit origins, \
                 which events do not carry",
            )),
            other => Err(Error::config(format!("unknown info extractor '{other}'"))),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
impl InfoExtractor for BuiltinExtractor {
    fn extract(&self, event: &Event) -> Result<InfoRecord> {
        let header = InfoRecord::new()
            .with("event_id", event.info.event_id as f64)
            .with("run_id", event.info.run_id as f64);
        match self {
            Self::Neutrino => {
                let track = event.track.ok_or_else(|| {
                    Error::config(format!(
                        "event {} has no MC track for the neutrino extractor",
                        event.info.event_id
                    ))
                })?;
                Ok(header
                    .with("particle_type", track.particle_type as f64)
                    .with("energy", track.energy)
                    .with("is_cc", track.is_cc)
                    .with("bjorkeny", track.bjorkeny)
                    .with("dir_x", track.dir_x)
                    .with("dir_y", track.dir_y)
                    .with("dir_z", track.dir_z)
                    .with("time_interaction", track.time))
            }
            Self::RealData => Ok(header.with("trigger_mask", event.info.trigger_mask as f64)),
            Self::RandomNoise => Ok(header.with("particle_type", 0.0)),
        }
    }
}

/// Builds fixed-schema metadata records for a run.
pub struct McInfoMaker {
    extractor: Box<dyn InfoExtractor>,
    prod_ident: Option<i64>,
    fields: Option<Vec<String>>,
}

impl fmt::Debug for McInfoMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McInfoMaker")
            .field("prod_ident", &self.prod_ident)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl McInfoMaker {
    pub fn new(extractor: impl InfoExtractor + 'static, prod_ident: Option<i64>) -> Self {
        Self {
            extractor: Box::new(extractor),
            prod_ident,
            fields: None,
        }
    }

    /// Looks up a built-in extractor by name.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown name.
    pub fn builtin(name: &str, prod_ident: Option<i64>) -> Result<Self> {
        Ok(Self::new(name.parse::<BuiltinExtractor>()?, prod_ident))
    }

    /// Field names fixed by the first record, if any was made.
    #[must_use]
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Extracts the record for `event`.
    ///
    /// # Errors
    /// Returns a configuration error if extraction fails or the field set
    /// differs from the first record of the run.
    #[allow(clippy::cast_precision_loss)]
    pub fn make(&mut self, event: &Event) -> Result<InfoRecord> {
        let mut record = self.extractor.extract(event)?;
        if let Some(prod_ident) = self.prod_ident {
            record.push(PROD_IDENT_FIELD, prod_ident as f64);
        }
        match &self.fields {
            Some(fields) if fields.as_slice() != record.names() => {
                return Err(Error::config(format!(
                    "metadata fields of event {} changed: expected {:?}, got {:?}",
                    event.info.event_id,
                    fields,
                    record.names()
                )));
            }
            Some(_) => {}
            None => self.fields = Some(record.names().to_vec()),
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitbin_core::{EventInfo, HitSet, McTrack};

    fn neutrino_event(id: i64) -> Event {
        Event::new(
            EventInfo {
                event_id: id,
                run_id: 7,
                trigger_mask: 16,
            },
            HitSet::default(),
        )
        .with_track(McTrack {
            particle_type: 14,
            energy: 12.5,
            is_cc: 1.0,
            bjorkeny: 0.3,
            dir_x: 0.0,
            dir_y: 0.6,
            dir_z: 0.8,
            time: 5.0,
        })
    }

    #[test]
    fn test_neutrino_fields() {
        let mut maker = McInfoMaker::builtin("neutrino", Some(3)).unwrap();
        let record = maker.make(&neutrino_event(1)).unwrap();
        assert_eq!(
            record.names(),
            [
                "event_id",
                "run_id",
                "particle_type",
                "energy",
                "is_cc",
                "bjorkeny",
                "dir_x",
                "dir_y",
                "dir_z",
                "time_interaction",
                "prod_ident",
            ]
        );
        assert_eq!(record.get("energy"), Some(12.5));
        assert_eq!(record.get("prod_ident"), Some(3.0));
        assert_eq!(maker.fields().unwrap().len(), 11);
    }

    #[test]
    fn test_real_data_and_noise() {
        let event = neutrino_event(2);
        let real = BuiltinExtractor::RealData.extract(&event).unwrap();
        assert_eq!(real.names(), ["event_id", "run_id", "trigger_mask"]);
        assert_eq!(real.get("trigger_mask"), Some(16.0));

        let noise = BuiltinExtractor::RandomNoise.extract(&event).unwrap();
        assert_eq!(noise.get("particle_type"), Some(0.0));
    }

    #[test]
    fn test_neutrino_without_track() {
        let event = Event::new(EventInfo::default(), HitSet::default());
        let err = BuiltinExtractor::Neutrino.extract(&event).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_unknown_extractor() {
        assert!(McInfoMaker::builtin("muon", None).unwrap_err().is_config());
        let err = McInfoMaker::builtin("mupage", None).unwrap_err();
        assert!(err.to_string().contains("muon track"));
    }

    #[test]
    fn test_maker_debug_lists_schema() {
        let mut maker = McInfoMaker::builtin("real_data", Some(4)).unwrap();
        assert_eq!(
            format!("{maker:?}"),
            "McInfoMaker { prod_ident: Some(4), fields: None, .. }"
        );
        maker.make(&neutrino_event(1)).unwrap();
        let shown = format!("{maker:?}");
        assert!(shown.contains("\"trigger_mask\", \"prod_ident\""));
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let extractor = |event: &Event| -> Result<InfoRecord> {
            let record = InfoRecord::new().with("event_id", 1.0);
            if event.info.event_id > 1 {
                Ok(record.with("extra", 2.0))
            } else {
                Ok(record)
            }
        };
        let mut maker = McInfoMaker::new(extractor, None);
        assert!(maker.make(&neutrino_event(1)).is_ok());
        assert!(maker.make(&neutrino_event(1)).is_ok());
        assert!(maker.make(&neutrino_event(2)).unwrap_err().is_config());
    }
}
