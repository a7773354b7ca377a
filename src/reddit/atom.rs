//! RSS adapter. Reddit's `/.rss` endpoints serve Atom, so this reads `<feed>`/`<entry>`.

use super::{EntryBody, FeedEntry, ScrapeError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Title,
    AuthorName,
    AuthorUri,
    Content,
}

pub(super) fn parse_feed(url: &str, body: &[u8]) -> Result<Vec<FeedEntry>, ScrapeError> {
    let malformed = |reason: String| ScrapeError::MalformedFeed {
        url: url.to_string(),
        reason,
    };
    let xml = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut saw_feed = false;
    let mut entry: Option<FeedEntry> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"feed" => saw_feed = true,
                b"entry" => entry = Some(FeedEntry::default()),
                b"author" if entry.is_some() => in_author = true,
                _ => {
                    if let Some(current) = entry.as_mut() {
                        field = open_element(current, &e, in_author);
                        text.clear();
                    }
                }
            },
            Ok(Event::Empty(e)) => {
                if let Some(current) = entry.as_mut() {
                    open_element(current, &e, in_author);
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    let value = t
                        .unescape()
                        .map_err(|e| malformed(format!("bad text: {}", e)))?;
                    text.push_str(&value);
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(done) = entry.take() {
                        entries.push(done);
                    }
                    in_author = false;
                    field = None;
                }
                b"author" => in_author = false,
                _ => {
                    if let (Some(f), Some(current)) = (field.take(), entry.as_mut()) {
                        close_field(current, f, std::mem::take(&mut text));
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(malformed(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if !saw_feed {
        return Err(malformed("document is not an Atom feed".to_string()));
    }
    Ok(entries)
}

/// Record attributes of an element inside an entry; returns the text field it opens, if any.
fn open_element(entry: &mut FeedEntry, e: &BytesStart<'_>, in_author: bool) -> Option<Field> {
    match e.local_name().as_ref() {
        b"name" if in_author => Some(Field::AuthorName),
        b"uri" if in_author => Some(Field::AuthorUri),
        b"id" if !in_author => Some(Field::Id),
        b"title" if !in_author => Some(Field::Title),
        b"content" if attr(e, "type").as_deref() == Some("html") => Some(Field::Content),
        b"category" => {
            if entry.category.is_none() {
                entry.category = attr(e, "term");
            }
            None
        }
        b"link" => {
            if entry.post_link.is_none() {
                entry.post_link = attr(e, "href");
            }
            None
        }
        _ => None,
    }
}

fn close_field(entry: &mut FeedEntry, field: Field, text: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    match field {
        Field::Id => entry.id = Some(text.trim_start_matches("t3_").to_string()),
        Field::Title => entry.title = Some(text),
        Field::AuthorName => entry.author_name = Some(text.trim_start_matches("/u/").to_string()),
        Field::AuthorUri => entry.author_link = Some(text),
        Field::Content => entry.body = EntryBody::Html(text),
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}
