/// Max. number of bytes rendered in log messages
pub(crate) const PREVIEW_LENGTH: usize = 32;

/// Hex encodes the first [PREVIEW_LENGTH] bytes of `data` for logging
pub(crate) fn preview<'a>(data: &[u8], buffer: &'a mut [u8; PREVIEW_LENGTH * 2]) -> &'a str {
    let data = &data[..data.len().min(PREVIEW_LENGTH)];
    let length = base16::encode_config_slice(data, base16::EncodeLower, buffer);

    core::str::from_utf8(&buffer[..length]).unwrap_or("")
}
