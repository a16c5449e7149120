//! Checked conversions between rust and sql types.

use super::*;
use bigdecimal::{FromPrimitive, ToPrimitive};
use std::str::FromStr;

pub fn i32_to_u32(i: i32) -> Result<u32, String> {
    u32::try_from(i).map_err(|_| format!("i32 value {i} is negative and cannot be converted to u32"))
}
pub fn u32_to_i32(i: u32) -> Result<i32, String> {
    i32::try_from(i).map_err(|_| format!("u32 value {i} exceeds i32::MAX"))
}

pub fn i32_to_u8(i: i32) -> Result<u8, String> {
    u8::try_from(i).map_err(|_| format!("i32 value {i} is out of range for u8"))
}
pub fn u8_to_i32(i: u8) -> i32 {
    i32::from(i)
}

pub fn i64_to_usize(i: i64) -> Result<usize, String> {
    usize::try_from(i).map_err(|_| format!("i64 value {i} cannot be converted to usize"))
}

pub fn opti32_to_optu32(i: Option<i32>) -> Result<Option<u32>, String> {
    i.map(i32_to_u32).transpose()
}
pub fn optu32_to_opti32(i: Option<u32>) -> Result<Option<i32>, String> {
    i.map(u32_to_i32).transpose()
}

pub fn bigdec_to_f64(i: &BigDecimal) -> Result<f64, String> {
    i.to_f64()
        .ok_or_else(|| format!("BigDecimal value {i} cannot be converted to f64"))
}
pub fn f64_to_bigdec(i: f64) -> Result<BigDecimal, String> {
    BigDecimal::from_f64(i)
        .map(|d| d.with_scale_round(2, bigdecimal::RoundingMode::HalfEven))
        .ok_or_else(|| format!("f64 value {i} cannot be stored as a decimal"))
}

pub fn optbigdec_to_optf64(i: Option<BigDecimal>) -> Result<Option<f64>, String> {
    i.as_ref().map(bigdec_to_f64).transpose()
}
pub fn optf64_to_optbigdec(i: Option<f64>) -> Result<Option<BigDecimal>, String> {
    i.map(f64_to_bigdec).transpose()
}

/// Enum columns are stored as their snake_case label.
pub fn parse_label<T: FromStr<Err = String>>(i: &str) -> Result<T, String> {
    i.parse()
}
pub fn parse_opt_label<T: FromStr<Err = String>>(i: Option<String>) -> Result<Option<T>, String> {
    i.as_deref().map(parse_label).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GradeKind, LessonKind};

    #[test_log::test]
    fn test_integer_conversions() {
        assert_eq!(i32_to_u32(5), Ok(5));
        assert!(i32_to_u32(-1).is_err());
        assert!(u32_to_i32(u32::MAX).is_err());
        assert_eq!(i32_to_u8(255), Ok(255));
        assert!(i32_to_u8(256).is_err());
        assert_eq!(opti32_to_optu32(None), Ok(None));
        assert!(optu32_to_opti32(Some(u32::MAX)).is_err());
    }

    #[test_log::test]
    fn test_decimal_conversions() {
        let stored = f64_to_bigdec(9.5).unwrap();
        assert_eq!(stored.to_string(), "9.50");
        assert_eq!(bigdec_to_f64(&stored), Ok(9.5));
        assert_eq!(optbigdec_to_optf64(None), Ok(None));
        assert!(f64_to_bigdec(f64::NAN).is_err());
    }

    #[test_log::test]
    fn test_labels() {
        assert_eq!(parse_label::<GradeKind>("excused_absence"), Ok(GradeKind::ExcusedAbsence));
        assert!(parse_label::<LessonKind>("weekly").is_err());
        assert_eq!(parse_opt_label::<GradeKind>(None), Ok(None));
    }
}
