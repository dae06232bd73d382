/// Internet checksum (RFC 1071) over `data`, ready to be written in network byte order.
///
/// Byte pairs are summed as `high * 256 + low`, i.e. swapped with respect to the
/// wire. One's complement addition is byte-order independent, so swapping the
/// complemented result back yields the big-endian checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u64 = 0;

    let mut pairs = data.chunks_exact(2);
    for pair in &mut pairs {
        let (low, high) = (pair[0] as u64, pair[1] as u64);
        sum = (sum + high * 256 + low) & 0xffff_ffff;
    }

    if let [last] = pairs.remainder() {
        sum = (sum + *last as u64) & 0xffff_ffff;
    }

    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;

    let answer = (!sum & 0xffff) as u16;
    answer.swap_bytes()
}
