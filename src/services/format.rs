// 字节大小格式化（二进制单位）

const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// 把带符号的字节数格式化为二进制单位文本
///
/// 小于 1024 时输出 `"<n> B"`；否则选择使缩放后数值落在 [1, 1024) 的最大单位，
/// 保留一位小数（四舍五入，远离零），如 `"1.5 MiB"`。符号保留。
pub fn format_bytes(bytes: i64) -> String {
    let abs = bytes.unsigned_abs();
    if abs < 1024 {
        return format!("{} B", bytes);
    }

    // 阈值比 1024 的整数次幂略小，保证 1023.95 这类值进位到下一个单位
    const THRESHOLD: u64 = 0x0fff_cccc_cccc_cccc;

    let mut value = abs;
    let mut unit = 0;
    let mut shift: i32 = 40;
    while shift >= 0 && abs > THRESHOLD >> shift {
        value >>= 10;
        unit += 1;
        shift -= 10;
    }

    // value / 1024 保留一位小数：整数运算避免浮点的银行家舍入
    let tenths = (value as u128 * 20 + 1024) / 2048;
    let sign = if bytes < 0 { "-" } else { "" };
    format!(
        "{}{}.{} {}iB",
        sign,
        tenths / 10,
        tenths % 10,
        UNITS[unit]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values_are_plain_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1), "1 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(-1023), "-1023 B");
    }

    #[test]
    fn test_binary_units() {
        assert_eq!(format_bytes(1024), "1.0 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1_048_576), "1.0 MiB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MiB");
        assert_eq!(format_bytes(1 << 30), "1.0 GiB");
        assert_eq!(format_bytes(1 << 40), "1.0 TiB");
        assert_eq!(format_bytes(1 << 50), "1.0 PiB");
        assert_eq!(format_bytes(1 << 60), "1.0 EiB");
    }

    #[test]
    fn test_sign_is_preserved() {
        assert_eq!(format_bytes(-2048), "-2.0 KiB");
        assert_eq!(format_bytes(-1_048_576), "-1.0 MiB");
    }

    #[test]
    fn test_rounding_half_up() {
        // 1280 / 1024 = 1.25
        assert_eq!(format_bytes(1280), "1.3 KiB");
        assert_eq!(format_bytes(-1280), "-1.3 KiB");
    }

    #[test]
    fn test_values_near_boundary_promote_unit() {
        // 1023.95 KiB 会四舍五入成 1024.0，所以直接显示为 MiB
        assert_eq!(format_bytes(1_048_525), "1.0 MiB");
        assert_eq!(format_bytes(1_048_524), "1023.9 KiB");
    }

    #[test]
    fn test_extremes() {
        assert_eq!(format_bytes(i64::MAX), "8.0 EiB");
        assert_eq!(format_bytes(i64::MIN), "-8.0 EiB");
    }

    #[test]
    fn test_suffix_for_non_negative_values() {
        for b in [0i64, 7, 1023, 1024, 999_999, 123_456_789, 1 << 45] {
            let s = format_bytes(b);
            assert!(s.ends_with(" B") || s.ends_with("iB"), "{}", s);
        }
    }
}
