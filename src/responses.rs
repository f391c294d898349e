//! Parsers for the textual AT responses
//!
//! Each parser handles one response shape and returns typed results instead of raw strings:
//! `+KEY:value` lines, comma separated fields, quoted fields and the numeric confirmation lines.

/// Line of the CIFSR response, e.g. `+CIFSR:STAIP,"10.0.0.181"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalAddressResponse<'a> {
    /// Address type
    /// * STAIP: Local IPv4 address
    /// * STAIP6LL: Link local IPv6 address
    /// * STAIP6GL: Global IPv6 address
    /// * STAMAC: Local MAC address
    pub address_type: &'a str,

    /// String encoded address
    pub address: &'a str,
}

/// Iterates over all non-empty UTF-8 lines of a response. Binary garbage lines are skipped.
pub fn lines(response: &[u8]) -> impl Iterator<Item = &str> + '_ {
    response
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .filter_map(|line| core::str::from_utf8(line).ok())
}

/// Splits a `+KEY:value` line into key and value
pub fn key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    if !key.starts_with('+') {
        return None;
    }

    Some((key, value))
}

/// Returns the value of the first `+KEY:value` line with the given key
pub fn find_value<'a>(response: &'a [u8], key: &str) -> Option<&'a str> {
    lines(response)
        .filter_map(key_value)
        .find(|(line_key, _)| *line_key == key)
        .map(|(_, value)| value)
}

/// Splits a value into comma separated fields. Commas within quotes are not treated as separator.
pub fn fields(value: &str) -> Fields<'_> {
    Fields { rest: Some(value) }
}

/// Iterator returned by [fields]
#[derive(Clone, Debug)]
pub struct Fields<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        let mut quoted = false;
        let mut escaped = false;

        for (index, character) in rest.char_indices() {
            match character {
                _ if escaped => escaped = false,
                '\\' if quoted => escaped = true,
                '"' => quoted = !quoted,
                ',' if !quoted => {
                    self.rest = Some(&rest[index + 1..]);
                    return Some(&rest[..index]);
                }
                _ => {}
            }
        }

        self.rest = None;
        Some(rest)
    }
}

/// Strips the surrounding quotes of a field
pub fn unquote(field: &str) -> Option<&str> {
    field.strip_prefix('"')?.strip_suffix('"')
}

/// Parses the CIFSR line, returns None for other lines
pub fn local_address(line: &str) -> Option<LocalAddressResponse<'_>> {
    let (key, value) = key_value(line)?;
    if key != "+CIFSR" {
        return None;
    }

    let mut fields = fields(value);
    let address_type = fields.next()?;
    let address = unquote(fields.next()?)?;

    Some(LocalAddressResponse { address_type, address })
}

/// Parses the byte count of the `Recv N bytes` confirmation
pub fn receive_confirmation(response: &[u8]) -> Option<usize> {
    lines(response).find_map(|line| {
        let count = line.strip_prefix("Recv ")?.strip_suffix(" bytes")?;
        count.parse::<usize>().ok()
    })
}

/// Parses the failure code of `+CWJAP:<code>`
///
/// 1: connection timeout, 2: wrong password, 3: target AP not found, 4: connection failed
pub fn join_failure_code(response: &[u8]) -> Option<u8> {
    find_value(response, "+CWJAP")?.trim().parse::<u8>().ok()
}
