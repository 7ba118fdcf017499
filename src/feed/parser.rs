use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted in a feed document.
const MAX_DEPTH: usize = 64;

/// Errors produced while turning feed bytes into a [`ParsedFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Element nesting exceeded [`MAX_DEPTH`].
    #[error("Document nesting exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document ended with elements still open.
    #[error("Unexpected end of document inside <{0}>")]
    UnexpectedEof(String),

    /// Well-formed XML, but no `<channel>` under the root element.
    #[error("Document has no <channel> element")]
    MissingChannel,
}

/// One RSS document: the channel header plus its items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `<pubDate>` text, resolved later by the ingestion pipeline
    pub pub_date: String,
}

impl ParsedFeed {
    /// Decode HTML entities left in the human-readable fields.
    ///
    /// Feeds commonly escape markup twice (`&amp;amp;`), so the XML layer
    /// alone leaves entities behind in titles and descriptions.
    fn unescape_entities(&mut self) {
        self.title = html_escape::decode_html_entities(&self.title).into_owned();
        self.description = html_escape::decode_html_entities(&self.description).into_owned();
        for item in &mut self.items {
            item.title = html_escape::decode_html_entities(&item.title).into_owned();
            item.description = html_escape::decode_html_entities(&item.description).into_owned();
        }
    }
}

/// Where the reader currently is, relative to the RSS structure.
enum Position<'a> {
    Channel,
    ChannelField(&'a [u8]),
    Item,
    ItemField(&'a [u8]),
    Other,
}

fn position(path: &[Vec<u8>]) -> Position<'_> {
    // path[0] is the root element; its name is not checked
    if path.len() < 2 || path[1] != b"channel" {
        return Position::Other;
    }
    match path.len() {
        2 => Position::Channel,
        3 if path[2] == b"item" => Position::Item,
        3 => Position::ChannelField(&path[2]),
        4 if path[2] == b"item" => Position::ItemField(&path[3]),
        _ => Position::Other,
    }
}

fn in_field(path: &[Vec<u8>]) -> bool {
    matches!(
        position(path),
        Position::ChannelField(_) | Position::ItemField(_)
    )
}

/// Parse an RSS 2.0 document.
///
/// Element names are matched exactly, so namespaced siblings such as
/// `<atom:link>` never overwrite `<link>`. A field's value is its own
/// character data and CDATA, joined and trimmed once; text inside child
/// elements is skipped. After the structural parse, titles and descriptions
/// are entity-decoded.
///
/// # Errors
///
/// Malformed XML, unbalanced elements, excessive nesting, or a document
/// without a `<channel>` produce a [`ParseError`]; no partial result is
/// returned.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    // Entity declarations in a DOCTYPE are never expanded by quick-xml 0.37;
    // unknown entities fail unescaping and fall back to lossy decoding below.
    let mut reader = Reader::from_reader(bytes);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut feed: Option<ParsedFeed> = None;
    let mut item: Option<ParsedItem> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(e.name().as_ref().to_vec());
                if path.len() > MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
                // Elements nested inside a field neither reset nor add to its text
                match position(&path) {
                    Position::Channel => {
                        feed.get_or_insert_with(ParsedFeed::default);
                    }
                    Position::Item => item = Some(ParsedItem::default()),
                    Position::ChannelField(_) | Position::ItemField(_) => text.clear(),
                    Position::Other => {}
                }
            }
            Ok(Event::Text(e)) if in_field(&path) => text.push_str(&decode_text(&e)),
            Ok(Event::CData(e)) if in_field(&path) => {
                text.push_str(&String::from_utf8_lossy(&e))
            }
            Ok(Event::End(_)) => {
                let value = match position(&path) {
                    Position::ChannelField(_) | Position::ItemField(_) => {
                        std::mem::take(&mut text).trim().to_string()
                    }
                    _ => String::new(),
                };
                match position(&path) {
                    Position::ChannelField(name) => {
                        if let Some(feed) = feed.as_mut() {
                            match name {
                                b"title" => feed.title = value,
                                b"link" => feed.link = value,
                                b"description" => feed.description = value,
                                _ => {}
                            }
                        }
                    }
                    Position::ItemField(name) => {
                        if let Some(item) = item.as_mut() {
                            match name {
                                b"title" => item.title = value,
                                b"link" => item.link = value,
                                b"description" => item.description = value,
                                b"pubDate" => item.pub_date = value,
                                _ => {}
                            }
                        }
                    }
                    Position::Item => {
                        if let (Some(feed), Some(done)) = (feed.as_mut(), item.take()) {
                            feed.items.push(done);
                        }
                    }
                    Position::Channel | Position::Other => {}
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = path.last() {
        return Err(ParseError::UnexpectedEof(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }

    let mut feed = feed.ok_or(ParseError::MissingChannel)?;
    feed.unescape_entities();
    tracing::debug!(title = %feed.title, items = feed.items.len(), "Parsed feed");
    Ok(feed)
}

/// XML-unescape a text node, falling back to HTML entity decoding when the
/// text uses entities XML does not define (e.g. a bare `&nbsp;`).
fn decode_text(e: &BytesText<'_>) -> String {
    match e.unescape() {
        Ok(text) => text.into_owned(),
        Err(err) => {
            tracing::debug!(error = %err, "Non-XML entity in text, decoding as HTML");
            html_escape::decode_html_entities(&String::from_utf8_lossy(e)).into_owned()
        }
    }
}
