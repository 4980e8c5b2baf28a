//! Address pattern matching
//!
//! Every answer a detection source gives is checked here before the loop sees
//! it. IPv4 is a dotted quad with octets 0-255. IPv6 covers the full
//! colon-hex grammar: eight groups, `::` compression anywhere, and an
//! embedded IPv4 tail.

use crate::record::AddressFamily;
use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

const OCTET: &str = r"(25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])";
const HEX: &str = r"[0-9A-Fa-f]{1,4}";

fn ipv4_pattern() -> String {
    format!(r"({OCTET}\.){{3}}{OCTET}")
}

fn ipv6_pattern() -> String {
    let v4 = ipv4_pattern();
    [
        format!(r"(({HEX}:){{7}}({HEX}|:))"),
        format!(r"(({HEX}:){{6}}(:{HEX}|{v4}|:))"),
        format!(r"(({HEX}:){{5}}(((:{HEX}){{1,2}})|:{v4}|:))"),
        format!(r"(({HEX}:){{4}}(((:{HEX}){{1,3}})|((:{HEX})?:{v4})|:))"),
        format!(r"(({HEX}:){{3}}(((:{HEX}){{1,4}})|((:{HEX}){{0,2}}:{v4})|:))"),
        format!(r"(({HEX}:){{2}}(((:{HEX}){{1,5}})|((:{HEX}){{0,3}}:{v4})|:))"),
        format!(r"(({HEX}:){{1}}(((:{HEX}){{1,6}})|((:{HEX}){{0,4}}:{v4})|:))"),
        format!(r"(:(((:{HEX}){{1,7}})|((:{HEX}){{0,5}}:{v4})|:))"),
    ]
    .join("|")
}

// Both patterns are fixed strings; failing to compile them is a programming error.
static IPV4_FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:{})$", ipv4_pattern())).expect("IPv4 pattern compiles")
});

static IPV6_FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:{})$", ipv6_pattern())).expect("IPv6 pattern compiles")
});

/// Whether `candidate` is, in its entirety, an address of `family`
pub fn is_valid(family: AddressFamily, candidate: &str) -> bool {
    match family {
        AddressFamily::Ipv4 => IPV4_FULL.is_match(candidate),
        AddressFamily::Ipv6 => IPV6_FULL.is_match(candidate),
    }
}

/// Parse `candidate` as an address of `family`
///
/// Returns `None` for anything the pattern rejects, and for the rare strings
/// the pattern accepts but the standard parser does not.
pub fn parse(family: AddressFamily, candidate: &str) -> Option<IpAddr> {
    let candidate = candidate.trim();
    if !is_valid(family, candidate) {
        return None;
    }
    candidate
        .parse::<IpAddr>()
        .ok()
        .filter(|ip| family.matches(ip))
}

/// Find the first address of `family` in a response body
///
/// The body is split into runs of characters that can appear in an address
/// of `family` and each run must match the pattern in full, so `999.1.1.1` is
/// rejected outright rather than trimmed down to `99.1.1.1`. A single leading
/// colon is dropped, since labels such as `IP:` or `addr:` glue onto IPv6 runs.
pub fn extract(family: AddressFamily, body: &str) -> Option<IpAddr> {
    let is_address_char = |c: char| match family {
        AddressFamily::Ipv4 => c.is_ascii_digit() || c == '.',
        AddressFamily::Ipv6 => c.is_ascii_hexdigit() || c == '.' || c == ':',
    };

    body.split(|c: char| !is_address_char(c))
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            parse(family, token).or_else(|| {
                token
                    .strip_prefix(':')
                    .filter(|rest| !rest.starts_with(':'))
                    .and_then(|rest| parse(family, rest))
            })
        })
}
