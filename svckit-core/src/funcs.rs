//! Small helpers shared by services: digests, version and slice utilities,
//! time formatting and query-string building.

use std::{
    cmp::Ordering,
    collections::HashSet,
    fmt::Display,
    net::IpAddr,
    path::PathBuf,
};

use chrono::{Local, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::Rng;
use sha1::Sha1;
use sha2::Sha256;

const RANDOM_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Milliseconds since the Unix epoch.
pub fn millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Today's local date as a `YYYYMMDD` number.
pub fn date_number() -> i32 {
    Local::now()
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default()
}

/// Lowercase hex MD5 digest.
pub fn md5(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// The middle 16 characters of the MD5 digest.
pub fn md5_16(input: &str) -> String {
    md5(input)[8..24].to_string()
}

/// Lowercase hex SHA-1 digest.
pub fn sha1(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

/// Lowercase hex SHA-256 digest.
pub fn sha256(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Lowercase hex HMAC-SHA256 of `input` keyed with `key`.
pub fn hmac_sha256(input: &str, key: &str) -> String {
    Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map(|mut mac| {
            mac.update(input.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default()
}

/// IEEE CRC-32 checksum.
pub fn crc32(input: &str) -> u32 {
    crc32fast::hash(input.as_bytes())
}

/// Compares dotted version strings numerically, segment by segment.
///
/// Missing or non-numeric segments count as `0`, so `"1.2"` equals `"1.2.0"`.
pub fn compare_version(left: &str, right: &str) -> Ordering {
    let left = left.split('.').collect::<Vec<_>>();
    let right = right.split('.').collect::<Vec<_>>();
    let segment = |parts: &[&str], index: usize| -> i64 {
        parts
            .get(index)
            .and_then(|part| part.trim().parse().ok())
            .unwrap_or(0)
    };

    (0..left.len().max(right.len()))
        .map(|index| segment(&left, index).cmp(&segment(&right, index)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Returns the items of `source` that do not appear in `exclude`, in order.
pub fn sub_slice(source: &[String], exclude: &[String]) -> Vec<String> {
    let exclude = exclude.iter().collect::<HashSet<_>>();

    source
        .iter()
        .filter(|item| !exclude.contains(item))
        .cloned()
        .collect()
}

/// Sorts, deduplicates and drops empty strings.
pub fn remove_duplicates_and_empty(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items.retain(|item| !item.is_empty());
    items
}

/// Returns `true` for loopback and private-range addresses.
///
/// IPv4 private ranges are 10/8, 172.16/12, 169.254/16 and 192.168/16.
pub fn is_local_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    let v4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4,
            None => return false,
        },
    };

    v4.is_loopback() || v4.is_private() || v4.is_link_local()
}

/// Parses `ip` and checks it with [`is_local_ip`]. Unparsable input is not local.
pub fn is_local_ip_str(ip: &str) -> bool {
    ip.parse().map(is_local_ip).unwrap_or(false)
}

/// Masks the middle of an identifier such as a phone number.
///
/// Up to 4 characters are returned unchanged, up to 8 keep 2 on each side,
/// longer values keep the first 3 and the last 4.
pub fn desensitize(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    let len = chars.len();
    let keep = |head: usize, mask: &str, tail: usize| {
        let mut masked = chars[..head].iter().collect::<String>();
        masked.push_str(mask);
        masked.extend(&chars[len - tail..]);
        masked
    };

    match len {
        0..=4 => value.to_string(),
        5..=8 => keep(2, "**", 2),
        _ => keep(3, "****", 4),
    }
}

/// Random string of lowercase letters and digits.
pub fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

/// Formats a duration in milliseconds as `mm:ss` below one hour and `hh:mm:ss` otherwise.
///
/// Durations under one second use the long form.
pub fn fit_time_span(millis: u64) -> String {
    let seconds = millis / 1000;
    let (hours, minutes, secs) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);

    if (1000..3_600_000).contains(&millis) {
        format!("{minutes:02}:{secs:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    }
}

/// Joins `key=value` pairs with `&` in iteration order. Values are not escaped.
pub fn http_build_query<K, V>(params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: Display,
    V: Display,
{
    params
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Directory containing the running executable, falling back to the working directory.
pub fn root_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn digests_match_known_vectors() {
        assert_eq!(md5("abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_16("abc"), "3cd24fb0d6963f7d");
        assert_eq!(sha1("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            sha256("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(crc32("123456789"), 0xCBF4_3926);
        assert_eq!(
            hmac_sha256("The quick brown fox jumps over the lazy dog", "key"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_version("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_version("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_version("2.0", "2.0.1"), Ordering::Less);
        assert_eq!(compare_version("1.x", "1.0"), Ordering::Equal);
    }

    #[test]
    fn slices_are_filtered_and_deduplicated() {
        assert_eq!(
            sub_slice(&strings(&["a", "b", "c", "b"]), &strings(&["b"])),
            strings(&["a", "c"])
        );
        assert_eq!(
            remove_duplicates_and_empty(strings(&["b", "", "a", "b"])),
            strings(&["a", "b"])
        );
    }

    #[test]
    fn local_addresses() {
        assert!(is_local_ip_str("127.0.0.1"));
        assert!(is_local_ip_str("10.1.2.3"));
        assert!(is_local_ip_str("172.20.0.1"));
        assert!(is_local_ip_str("192.168.1.1"));
        assert!(is_local_ip_str("169.254.0.7"));
        assert!(is_local_ip_str("::1"));
        assert!(!is_local_ip_str("172.32.0.1"));
        assert!(!is_local_ip_str("8.8.8.8"));
        assert!(!is_local_ip_str("not an ip"));
    }

    #[test]
    fn desensitize_masks_by_length() {
        assert_eq!(desensitize("1234"), "1234");
        assert_eq!(desensitize("1234567"), "12**67");
        assert_eq!(desensitize("13812345678"), "138****5678");
    }

    #[test]
    fn random_string_uses_alphabet() {
        let value = random_string(32);

        assert_eq!(value.len(), 32);
        assert!(value.bytes().all(|b| RANDOM_ALPHABET.contains(&b)));
    }

    #[test]
    fn time_spans() {
        assert_eq!(fit_time_span(65_000), "01:05");
        assert_eq!(fit_time_span(3_723_000), "01:02:03");
        assert_eq!(fit_time_span(500), "00:00:00");
    }

    #[test]
    fn query_string_keeps_order() {
        let params = BTreeMap::from([("b", "2"), ("a", "1")]);

        assert_eq!(http_build_query(params), "a=1&b=2");
        assert_eq!(http_build_query(Vec::<(&str, i32)>::new()), "");
    }

    #[test]
    fn date_number_has_eight_digits() {
        let today = date_number();

        assert!((19_700_101..=99_991_231).contains(&today));
    }
}
