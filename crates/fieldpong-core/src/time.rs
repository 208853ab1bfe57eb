/// Milliseconds since the Unix epoch, used for pause timestamps on the wire.
pub fn epoch_millis() -> u64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_millis() as u64
}
