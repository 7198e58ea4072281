//! Textual CPU list parsing (`"0,1,5"`).

use crate::config::types::{CpuId, CpuMask, JailError, Result, SandboxConfig};

/// OR every CPU named in `list` into `mask`.
///
/// The character check runs over the whole list before any bit is set. A
/// range failure in a later segment leaves the bits of earlier segments in
/// place; callers treat it as fatal and never reuse the mask.
pub fn read_cpu_list(mask: &mut CpuMask, list: &str) -> Result<()> {
    if list.bytes().any(|b| b != b',' && !b.is_ascii_digit()) {
        return Err(JailError::InvalidCpuList {
            list: list.to_string(),
        });
    }

    for segment in list.split(',').filter(|segment| !segment.is_empty()) {
        let cpu = segment
            .parse::<u32>()
            .ok()
            .and_then(CpuId::new)
            .ok_or_else(|| JailError::CpuOutOfRange {
                segment: segment.to_string(),
            })?;
        mask.insert(cpu);
    }

    log::debug!("CPU list {:?} -> mask {:#x}", list, mask.bits());
    Ok(())
}

impl SandboxConfig {
    pub fn read_cpu_list(&mut self, list: &str) -> Result<()> {
        read_cpu_list(&mut self.cpus, list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &str) -> Result<CpuMask> {
        let mut mask = CpuMask::empty();
        read_cpu_list(&mut mask, list).map(|_| mask)
    }

    #[test]
    fn distinct_cpus_become_bits() {
        for (a, b, c) in [(0, 1, 2), (3, 17, 31), (30, 4, 9)] {
            let mask = parse(&format!("{},{},{}", a, b, c)).unwrap();
            assert_eq!(mask.bits(), (1 << a) | (1 << b) | (1 << c));
        }
    }

    #[test]
    fn concrete_list_matches_hex() {
        assert_eq!(parse("0,1,5").unwrap().bits(), 0x23);
    }

    #[test]
    fn empty_segments_are_ignored() {
        assert_eq!(parse("1,,2").unwrap().bits(), 0b110);
        assert_eq!(parse(",3,").unwrap().bits(), 0b1000);
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn leading_zeros_are_decimal() {
        assert_eq!(parse("010").unwrap().bits(), 1 << 10);
    }

    #[test]
    fn invalid_character_sets_no_bits() {
        let mut mask = CpuMask::empty();
        let err = read_cpu_list(&mut mask, "1,x").unwrap_err();
        assert!(matches!(err, JailError::InvalidCpuList { .. }));
        assert!(mask.is_empty());

        for list in ["1-3", " 1", "-1", "1;2", "0x1"] {
            assert!(matches!(parse(list), Err(JailError::InvalidCpuList { .. })), "{}", list);
        }
    }

    #[test]
    fn out_of_range_keeps_earlier_bits() {
        let mut mask = CpuMask::empty();
        let err = read_cpu_list(&mut mask, "1,99").unwrap_err();
        assert!(matches!(err, JailError::CpuOutOfRange { ref segment } if segment == "99"));
        assert_eq!(mask.bits(), 0b10);
    }

    #[test]
    fn first_out_of_range_cpu_is_32() {
        assert!(parse("31").is_ok());
        assert!(matches!(parse("32"), Err(JailError::CpuOutOfRange { .. })));
        assert!(matches!(
            parse("99999999999999999999"),
            Err(JailError::CpuOutOfRange { .. })
        ));
    }

    #[test]
    fn repeated_parses_only_grow_the_mask() {
        let mut config = SandboxConfig::default();
        config.read_cpu_list("2").unwrap();
        config.read_cpu_list("4,2").unwrap();
        assert_eq!(config.cpus.bits(), 0b10100);
    }
}
