//! Built-in generators.
//!
//! Every default scales with complexity `c`: numbers are bounded by a function
//! of `c`, strings and arrays draw their length uniformly from `0..=c`, so the
//! expected size grows with `c` and complexity 0 yields zeros and empty values.

use std::sync::Arc;

use rand::Rng;

use super::{FnGen, Gen};
use crate::array::ArrayWrapper;
use crate::invoke::{Fault, RandomSource, SideContext};
use crate::value::{TypeDescriptor, Value};

/// Largest denominator used when drawing fractional values.
pub const MAX_FP_DENOMINATOR: i64 = 9_999_999_999;
/// Cap on generated string and array lengths.
pub const MAX_GENERATED_LEN: u32 = 4096;
/// Largest complexity that feeds the floating-point numerator.
const MAX_FP_COMPLEXITY: i64 = 1_000_000;

pub fn gen_int(complexity: u32, random: &mut RandomSource) -> Value {
    let bound = i64::from(complexity).min(i64::from(i32::MAX / 2));
    Value::Int((random.gen_range(0..=2 * bound) - bound) as i32)
}

pub fn gen_byte(complexity: u32, random: &mut RandomSource) -> Value {
    let bound = i16::try_from(complexity).unwrap_or(i16::MAX).min(i16::from(i8::MAX));
    Value::Byte(random.gen_range(-bound..=bound) as i8)
}

pub fn gen_short(complexity: u32, random: &mut RandomSource) -> Value {
    let bound = i32::try_from(complexity).unwrap_or(i32::MAX).min(i32::from(i16::MAX));
    Value::Short(random.gen_range(-bound..=bound) as i16)
}

pub fn gen_long(complexity: u32, random: &mut RandomSource) -> Value {
    let c = i64::from(complexity);
    let bound = c.saturating_mul(c).saturating_mul(2).min(i64::MAX / 2);
    Value::Long(random.gen_range(-bound..=bound))
}

fn fraction(complexity: u32, random: &mut RandomSource) -> f64 {
    let c = i64::from(complexity).min(MAX_FP_COMPLEXITY);
    if c == 0 {
        return 0.0;
    }
    let denominator = random.gen_range(1..=MAX_FP_DENOMINATOR);
    let numerator = random.gen_range(-(c * denominator)..=(c * denominator));
    numerator as f64 / denominator as f64
}

pub fn gen_double(complexity: u32, random: &mut RandomSource) -> Value {
    Value::Double(fraction(complexity, random))
}

pub fn gen_float(complexity: u32, random: &mut RandomSource) -> Value {
    Value::Float(fraction(complexity, random) as f32)
}

/// Printable non-ASCII ranges mixed in as complexity grows.
const UNICODE_RANGES: [(u32, u32); 4] = [
    (0x00C0, 0x00FF),
    (0x0391, 0x03C9),
    (0x0410, 0x044F),
    (0x2190, 0x21FF),
];

pub fn gen_char(complexity: u32, random: &mut RandomSource) -> Value {
    let unicode_chance = (f64::from(complexity) * 0.15 / 32.0).min(0.15);
    if random.gen_bool(unicode_chance) {
        let (lo, hi) = UNICODE_RANGES[random.gen_range(0..UNICODE_RANGES.len())];
        if let Some(c) = char::from_u32(random.gen_range(lo..=hi)) {
            return Value::Char(c);
        }
    }
    Value::Char(random.gen_range(32u8..=126) as char)
}

pub fn gen_bool(_complexity: u32, random: &mut RandomSource) -> Value {
    Value::Bool(random.gen_bool(0.5))
}

pub fn gen_string(complexity: u32, random: &mut RandomSource) -> Value {
    let len = random.gen_range(0..=complexity.min(MAX_GENERATED_LEN));
    let text: String = (0..len)
        .map(|_| match gen_char(complexity, random) {
            Value::Char(c) => c,
            _ => ' ',
        })
        .collect();
    Value::Str(text)
}

/// Built-in generators for primitives and strings, keyed by type.
pub fn builtin() -> Vec<(TypeDescriptor, Arc<dyn Gen>)> {
    vec![
        (TypeDescriptor::Bool, Arc::new(FnGen::new("boolean", gen_bool)) as Arc<dyn Gen>),
        (TypeDescriptor::Byte, Arc::new(FnGen::new("byte", gen_byte))),
        (TypeDescriptor::Short, Arc::new(FnGen::new("short", gen_short))),
        (TypeDescriptor::Int, Arc::new(FnGen::new("int", gen_int))),
        (TypeDescriptor::Long, Arc::new(FnGen::new("long", gen_long))),
        (TypeDescriptor::Float, Arc::new(FnGen::new("float", gen_float))),
        (TypeDescriptor::Double, Arc::new(FnGen::new("double", gen_double))),
        (TypeDescriptor::Char, Arc::new(FnGen::new("char", gen_char))),
        (TypeDescriptor::Str, Arc::new(FnGen::new("String", gen_string))),
    ]
}

/// Arrays of any generatable element type, nested to any depth.
///
/// Length is uniform in `0..=c`; each element is generated at a complexity
/// uniform in `0..=c`.
pub struct ArrayGen {
    element_type: TypeDescriptor,
    element: Arc<dyn Gen>,
}

impl ArrayGen {
    pub fn new(element_type: TypeDescriptor, element: Arc<dyn Gen>) -> Self {
        Self {
            element_type,
            element,
        }
    }
}

impl Gen for ArrayGen {
    fn generate(
        &self,
        complexity: u32,
        random: &mut RandomSource,
        side: &Arc<SideContext>,
    ) -> Result<Value, Fault> {
        let len = random.gen_range(0..=complexity.min(MAX_GENERATED_LEN)) as usize;
        let mut array = ArrayWrapper::new(&self.element_type, len);
        for i in 0..len {
            let element_complexity = random.gen_range(0..=complexity);
            let value = self.element.generate(element_complexity, random, side)?;
            array.set(i, value)?;
        }
        Ok(array.into_value())
    }

    fn describe(&self) -> String {
        format!("default {}[] of {}", self.element_type, self.element.describe())
    }
}

/// Uniform choice among an enum's variants.
pub struct EnumGen {
    name: String,
    variants: Vec<String>,
}

impl EnumGen {
    pub fn new(name: impl Into<String>, variants: Vec<String>) -> Self {
        Self {
            name: name.into(),
            variants,
        }
    }
}

impl Gen for EnumGen {
    fn generate(
        &self,
        _complexity: u32,
        random: &mut RandomSource,
        _side: &Arc<SideContext>,
    ) -> Result<Value, Fault> {
        if self.variants.is_empty() {
            return Ok(Value::Null);
        }
        let variant = &self.variants[random.gen_range(0..self.variants.len())];
        Ok(Value::enum_variant(&self.name, variant))
    }

    fn describe(&self) -> String {
        format!("default enum {}", self.name)
    }
}
