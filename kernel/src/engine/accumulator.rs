//! A growable, nullable column of fixed-width values.

use std::mem::size_of;

use tracing::trace;

use crate::arrow::array::{ArrayBuilder, PrimitiveArray, PrimitiveBuilder};
use crate::arrow::datatypes::ArrowPrimitiveType;
use crate::arrow::util::bit_util;
use crate::utils::require;
use crate::{Error, IcebergResult};

const INITIAL_CAPACITY: usize = 16;

/// A [`PrimitiveBuilder`] written in row order. Writing past the end fills the gap with nulls;
/// rows already written cannot be rewritten.
#[derive(Debug)]
pub struct Accumulator<T: ArrowPrimitiveType> {
    builder: PrimitiveBuilder<T>,
}

impl<T: ArrowPrimitiveType> Default for Accumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ArrowPrimitiveType> Accumulator<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            builder: PrimitiveBuilder::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.builder.capacity()
    }

    pub fn append(&mut self, value: Option<T::Native>) {
        self.reserve_if_needed(1);
        self.builder.append_option(value);
    }

    /// Write `value` at `index`, padding any rows before it with nulls.
    pub fn set(&mut self, index: usize, value: Option<T::Native>) -> IcebergResult<()> {
        require!(
            index >= self.len(),
            Error::internal_error(format!(
                "{} vector row {index} was already written (length {})",
                T::DATA_TYPE,
                self.len()
            ))
        );
        self.pad_to(index);
        self.append(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<T::Native> {
        let valid = match self.builder.validity_slice() {
            Some(bits) => index < self.len() && bit_util::get_bit(bits, index),
            None => true,
        };
        valid
            .then(|| self.builder.values_slice().get(index).copied())
            .flatten()
    }

    /// Append nulls until the accumulator holds `len` rows
    pub fn pad_to(&mut self, len: usize) {
        if len > self.len() {
            let missing = len - self.len();
            self.reserve_if_needed(missing);
            self.builder.append_nulls(missing);
        }
    }

    /// Memory held by written values and their validity bits
    pub fn size_in_bytes(&self) -> usize {
        self.len() * size_of::<T::Native>() + self.len().div_ceil(8)
    }

    /// Grow (doubling) so that `additional` more rows fit without reallocating mid-row.
    pub fn reserve_if_needed(&mut self, additional: usize) {
        let required = self.len() + additional;
        if required > self.capacity() {
            let new_capacity = required.next_power_of_two().max(INITIAL_CAPACITY);
            let element = T::DATA_TYPE;
            trace!(
                %element,
                from = self.capacity(),
                to = new_capacity,
                "growing accumulator"
            );
            self.builder.reserve(new_capacity - self.len());
        }
    }

    /// Hand the written rows over as an arrow array, leaving the accumulator empty.
    pub fn finish(&mut self) -> PrimitiveArray<T> {
        self.builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::arrow::array::Array;
    use crate::arrow::datatypes::{Int32Type, Int64Type};

    use super::*;

    #[test]
    fn test_set_pads_with_nulls() {
        let mut acc = Accumulator::<Int64Type>::new();
        acc.set(0, Some(10)).unwrap();
        acc.set(3, Some(20)).unwrap();
        assert_eq!(acc.len(), 4);
        assert_eq!(acc.get(0), Some(10));
        assert_eq!(acc.get(1), None);
        assert_eq!(acc.get(3), Some(20));
        assert_eq!(acc.get(4), None);
    }

    #[test]
    fn test_rewrite_rejected() {
        let mut acc = Accumulator::<Int32Type>::new();
        acc.append(Some(1));
        let err = acc.set(0, Some(2)).unwrap_err();
        assert!(err.to_string().contains("row 0 was already written"));
    }

    #[test]
    fn test_grows_and_reports_size() {
        let mut acc = Accumulator::<Int64Type>::with_capacity(0);
        for i in 0..17 {
            acc.append(Some(i));
        }
        assert!(acc.capacity() >= 32);
        assert_eq!(acc.size_in_bytes(), 17 * 8 + 3);
    }

    #[test]
    fn test_finish() {
        let mut acc = Accumulator::<Int32Type>::new();
        acc.append(Some(15));
        acc.append(None);
        let array = acc.finish();
        assert_eq!(array.len(), 2);
        assert_eq!(array.value(0), 15);
        assert!(array.is_null(1));
        assert!(acc.is_empty());
    }
}
