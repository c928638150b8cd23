use common::{Candle, Error, Result};

use crate::indicators::{Field, Indicator, IndicatorValue};

/// Typed slot reference returned by [`IndicatorSet::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndicatorHandle(usize);

impl IndicatorHandle {
    pub fn index(self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }
}

/// Outputs of every slot for one candle. A slot is `None` while its indicator
/// is still warming up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorValues {
    slots: Vec<Option<IndicatorValue>>,
}

impl IndicatorValues {
    pub fn from_slots(slots: Vec<Option<IndicatorValue>>) -> Self {
        Self { slots }
    }

    pub fn get(&self, handle: IndicatorHandle) -> Option<IndicatorValue> {
        self.slots.get(handle.0).copied().flatten()
    }

    pub fn field(&self, handle: IndicatorHandle, field: Field) -> Option<f64> {
        self.get(handle).and_then(|v| v.field(field))
    }

    pub fn scalar(&self, handle: IndicatorHandle) -> Option<f64> {
        self.field(handle, Field::Value)
    }

    pub fn is_all_formed(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Ordered collection of indicators fed from the same candle stream.
#[derive(Debug, Default)]
pub struct IndicatorSet {
    indicators: Vec<Box<dyn Indicator>>,
    sealed: bool,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an indicator. Only allowed before the owning strategy starts.
    pub fn attach(&mut self, indicator: impl Indicator + 'static) -> Result<IndicatorHandle> {
        if self.sealed {
            return Err(Error::invalid_config(format!(
                "cannot attach {} after start",
                indicator.name()
            )));
        }
        self.indicators.push(Box::new(indicator));
        Ok(IndicatorHandle(self.indicators.len() - 1))
    }

    /// Freeze the slot layout once the rule has been assembled.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Update every indicator, in registration order, with a finished candle.
    ///
    /// The candle is validated first; an indicator producing a non-finite value
    /// once formed is reported as `InvalidInput` as well.
    pub fn feed(&mut self, candle: &Candle) -> Result<IndicatorValues> {
        candle.validate()?;

        let mut slots = Vec::with_capacity(self.indicators.len());
        for ind in &mut self.indicators {
            let value = ind.update(candle)?;
            if !ind.is_formed() {
                slots.push(None);
                continue;
            }
            if !value.is_finite() {
                return Err(Error::invalid_input(
                    ind.name(),
                    format!("non-finite output {value:?} on {}", candle.open_time),
                ));
            }
            slots.push(Some(value));
        }
        Ok(IndicatorValues { slots })
    }

    pub fn is_all_formed(&self) -> bool {
        self.indicators.iter().all(|i| i.is_formed())
    }

    pub fn reset(&mut self) {
        for ind in &mut self.indicators {
            ind.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indicators.iter().map(|i| i.name())
    }
}
