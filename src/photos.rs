use teloxide::types::ChatId;
use tracing::{error, info};

use crate::airtable::PhotoRecord;
use crate::platform::ReplySink;

pub const NOT_FOUND_TEXT: &str = "Фотографии не найдены.";
pub const DONE_TEXT: &str = "Готово ✅";

/// Telegram caption limit, in UTF-16 code units.
const CAPTION_LIMIT: usize = 1024;

/// Outcome of one photos reply, for logging only. Users never see it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send every record as a photo message, in order, then one confirmation.
///
/// An empty list gets a single "not found" message instead. A failed photo is
/// logged and skipped; it never stops the rest of the batch.
pub async fn deliver_photos(
    sink: &dyn ReplySink,
    chat_id: ChatId,
    photos: &[PhotoRecord],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    if photos.is_empty() {
        if let Err(e) = sink.send_text(chat_id, NOT_FOUND_TEXT).await {
            error!("Failed to send 'not found' message to {}: {:#}", chat_id, e);
        }
        return report;
    }

    for photo in photos {
        let caption = caption_for(&photo.name);
        match sink.send_photo(chat_id, &photo.photo_url, &caption).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                error!("Failed to send photo '{}': {:#}", photo.name, e);
            }
        }
    }

    if let Err(e) = sink.send_text(chat_id, DONE_TEXT).await {
        error!("Failed to send confirmation to {}: {:#}", chat_id, e);
    }

    info!(
        "Delivered {} photo(s) to {} ({} failed)",
        report.sent, chat_id, report.failed
    );
    report
}

fn caption_for(name: &str) -> String {
    if name.encode_utf16().count() <= CAPTION_LIMIT {
        return name.to_string();
    }
    // Leave one unit for the ellipsis.
    let mut caption = String::new();
    let mut units = 0;
    for c in name.chars() {
        if units + c.len_utf16() > CAPTION_LIMIT - 1 {
            break;
        }
        units += c.len_utf16();
        caption.push(c);
    }
    caption.push('…');
    caption
}
