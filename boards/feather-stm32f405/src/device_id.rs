//! Session client identifier derived from the 96-bit factory UID

use heapless::String;
use static_cell::StaticCell;

/// "meter-" (6 chars) + 24 hex chars
const CLIENT_ID_MAX_LEN: usize = 30;

const CLIENT_ID_PREFIX: &str = "meter-";

/// Stable per-chip client id, `meter-{uid_hex}`
///
/// Built once; the returned slice lives for the rest of the program.
pub fn client_id() -> &'static str {
    static CLIENT_ID: StaticCell<String<CLIENT_ID_MAX_LEN>> = StaticCell::new();

    let mut id = String::<CLIENT_ID_MAX_LEN>::new();
    for part in [CLIENT_ID_PREFIX, embassy_stm32::uid::uid_hex()] {
        // Capacity covers prefix + UID exactly
        if id.push_str(part).is_err() {
            defmt::warn!("Client id truncated");
            break;
        }
    }
    CLIENT_ID.init(id).as_str()
}
