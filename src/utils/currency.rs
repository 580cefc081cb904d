//! Satoshi amount formatting for CLI summaries

/// Satoshis per Bitcoin
const SATS_PER_BTC: f64 = 100_000_000.0;

/// Format a satoshi amount as dual BTC + sats display
///
/// # Examples
/// ```
/// use covenant_token::utils::currency::format_sats_as_btc;
///
/// assert_eq!(format_sats_as_btc(10_000), "0.00010000 BTC (10000 sats)");
/// assert_eq!(format_sats_as_btc(5471), "0.00005471 BTC (5471 sats)");
/// ```
pub fn format_sats_as_btc(sats: u64) -> String {
    let btc = sats as f64 / SATS_PER_BTC;
    format!("{:.8} BTC ({} sats)", btc, sats)
}

/// Fee paid per serialised byte; zero for an empty transaction
pub fn fee_rate(fee: u64, size_bytes: usize) -> f64 {
    if size_bytes == 0 {
        return 0.0;
    }
    fee as f64 / size_bytes as f64
}

/// Format a sat/byte rate as dual BTC/byte + sat/byte display
///
/// # Examples
/// ```
/// use covenant_token::utils::currency::format_rate_as_btc;
///
/// assert_eq!(
///     format_rate_as_btc(150.0),
///     "0.00000150 BTC/byte (150.00 sat/byte)"
/// );
/// ```
pub fn format_rate_as_btc(sats_per_byte: f64) -> String {
    format!(
        "{:.8} BTC/byte ({:.2} sat/byte)",
        sats_per_byte / SATS_PER_BTC,
        sats_per_byte
    )
}
