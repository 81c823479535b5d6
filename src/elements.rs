//! Element index built from a uiautomator accessibility dump.
//!
//! Only clickable or long-clickable nodes with a well-formed
//! `bounds="[x1,y1][x2,y2]"` attribute make it into the index. Indices follow
//! document order and are only meaningful for the dump they came from: a new
//! dump means a new index, never a patched one.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<node\b([^>]*?)/?>").expect("valid node regex"));

static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_:][-\w:.]*)\s*=\s*"([^"]*)""#).expect("valid attribute regex"));

static BOUNDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]\s*$").expect("valid bounds regex")
});

/// One interactable node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub index: usize,
    /// `text`, falling back to `content-desc`
    pub text: String,
    pub resource_id: String,
    pub center: (i32, i32),
    pub bounds: (i32, i32, i32, i32),
}

/// Interactable elements of one accessibility dump, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementIndex {
    elements: Vec<Element>,
}

impl ElementIndex {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Resolve an index; `-1` addresses the last element
    pub fn get(&self, index: i64) -> Option<&Element> {
        match index {
            -1 => self.elements.last(),
            i if i >= 0 => self.elements.get(i as usize),
            _ => None,
        }
    }

    /// First element labelled `needle`; see `find_any_text`
    pub fn find_text(&self, needle: &str) -> Option<&Element> {
        self.find_any_text(&[needle])
    }

    /// First element, in index order, whose trimmed text equals one of the
    /// needles ignoring case. Only when nothing matches exactly is a
    /// case-insensitive substring match accepted, again in index order.
    pub fn find_any_text(&self, needles: &[&str]) -> Option<&Element> {
        let needles: Vec<String> = needles
            .iter()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        let labelled = || {
            self.elements
                .iter()
                .filter(|e| !e.text.trim().is_empty())
                .map(|e| (e, e.text.trim().to_lowercase()))
        };

        labelled()
            .find(|(_, text)| needles.iter().any(|n| text == n))
            .or_else(|| labelled().find(|(_, text)| needles.iter().any(|n| text.contains(n.as_str()))))
            .map(|(e, _)| e)
    }

    /// One `index: text @ (x, y)` line per element, for prompts and logs
    pub fn describe(&self) -> String {
        self.elements
            .iter()
            .map(|e| {
                let label = if e.text.is_empty() { &e.resource_id } else { &e.text };
                format!("{}: {:?} @ ({}, {})", e.index, label, e.center.0, e.center.1)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a ElementIndex {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Parse `[x1,y1][x2,y2]`; rejects anything else, including empty or
/// inverted boxes
pub fn parse_bounds(raw: &str) -> Option<(i32, i32, i32, i32)> {
    let caps = BOUNDS_RE.captures(raw)?;
    let mut coords = [0i32; 4];
    for (slot, i) in coords.iter_mut().zip(1..=4) {
        *slot = caps.get(i)?.as_str().parse().ok()?;
    }
    let [x1, y1, x2, y2] = coords;
    (x1 < x2 && y1 < y2).then_some((x1, y1, x2, y2))
}

/// Build the element index for one accessibility dump.
///
/// Never fails: a dump with no recognisable nodes yields an empty index
/// and a warning.
pub fn build_index(snapshot: &[u8]) -> ElementIndex {
    let text = String::from_utf8_lossy(snapshot);
    if !text.contains("<node") {
        warn!(bytes = snapshot.len(), "accessibility snapshot has no nodes");
        return ElementIndex::empty();
    }

    let mut elements = Vec::new();
    for node in NODE_RE.captures_iter(&text) {
        let Some(attrs) = node.get(1) else { continue };
        let mut clickable = false;
        let mut bounds = None;
        let mut node_text = String::new();
        let mut content_desc = String::new();
        let mut resource_id = String::new();

        for attr in ATTR_RE.captures_iter(attrs.as_str()) {
            let value = attr.get(2).map(|m| m.as_str()).unwrap_or_default();
            match attr.get(1).map(|m| m.as_str()) {
                Some("clickable") | Some("long-clickable") if value == "true" => clickable = true,
                Some("bounds") => bounds = parse_bounds(value),
                Some("text") => node_text = unescape_xml(value),
                Some("content-desc") => content_desc = unescape_xml(value),
                Some("resource-id") => resource_id = value.to_string(),
                _ => {}
            }
        }

        let Some((x1, y1, x2, y2)) = bounds else { continue };
        if !clickable {
            continue;
        }

        let label = if node_text.trim().is_empty() { content_desc } else { node_text };
        elements.push(Element {
            index: elements.len(),
            text: label.trim().to_string(),
            resource_id,
            // i32 division truncates toward zero
            center: ((x1 + x2) / 2, (y1 + y2) / 2),
            bounds: (x1, y1, x2, y2),
        });
    }

    debug!(count = elements.len(), "built element index");
    ElementIndex::new(elements)
}

/// Load and index a dump from disk; a missing or unreadable file yields an
/// empty index
pub fn load_index(path: &Path) -> ElementIndex {
    match std::fs::read(path) {
        Ok(bytes) => build_index(&bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "accessibility snapshot not readable");
            ElementIndex::empty()
        }
    }
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" long-clickable="false" bounds="[0,0][1080,2400]">
    <node index="0" text="Create a vault" resource-id="md.obsidian:id/create" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[100,1700][981,1801]" />
    <node index="1" text="" resource-id="" class="android.widget.ImageButton" content-desc="More options" clickable="false" long-clickable="true" bounds="[980,150][1080,250]" />
    <node index="2" text="Broken" resource-id="" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[10,10][oops]" />
    <node index="3" text="Inverted" resource-id="" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[500,500][400,600]" />
    <node index="4" text="Label only" resource-id="" class="android.widget.TextView" content-desc="" clickable="false" long-clickable="false" bounds="[0,300][500,400]" />
    <node index="5" text="Notes &amp; ideas" resource-id="" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[0,500][301,601]" />
    <node index="6" text="Twin" resource-id="" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[0,700][100,800]" />
    <node index="7" text="Twin" resource-id="" class="android.widget.Button" content-desc="" clickable="true" long-clickable="false" bounds="[0,700][100,800]" />
  </node>
</hierarchy>"#;

    #[test]
    fn test_only_clickable_nodes_with_valid_bounds() {
        let index = build_index(DUMP.as_bytes());
        let texts: Vec<&str> = index.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Create a vault", "More options", "Notes & ideas", "Twin", "Twin"]);
        for element in &index {
            let (x1, y1, x2, y2) = element.bounds;
            assert!(x1 < x2 && y1 < y2);
        }
    }

    #[test]
    fn test_indices_follow_document_order() {
        let index = build_index(DUMP.as_bytes());
        let indices: Vec<usize> = index.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_center_truncates() {
        let index = build_index(DUMP.as_bytes());
        let create = index.get(0).unwrap();
        assert_eq!(create.center, (540, 1750));
        assert_eq!(create.resource_id, "md.obsidian:id/create");
        // (0 + 301) / 2 = 150.5 -> 150, (500 + 601) / 2 = 550.5 -> 550
        assert_eq!(index.get(2).unwrap().center, (150, 550));
    }

    #[test]
    fn test_negative_center_truncates_toward_zero() {
        let dump = r#"<hierarchy><node text="Off" clickable="true" bounds="[-5,-9][0,0]" /></hierarchy>"#;
        let index = build_index(dump.as_bytes());
        assert_eq!(index.get(0).unwrap().center, (-2, -4));
    }

    #[test]
    fn test_identical_bounds_are_both_kept() {
        let index = build_index(DUMP.as_bytes());
        assert_eq!(index.get(3).unwrap().bounds, index.get(4).unwrap().bounds);
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_minus_one_is_last() {
        let index = build_index(DUMP.as_bytes());
        assert_eq!(index.get(-1).unwrap().index, 4);
        assert!(index.get(5).is_none());
        assert!(index.get(-2).is_none());
        assert!(ElementIndex::empty().get(-1).is_none());
    }

    #[test]
    fn test_find_text_first_match_wins() {
        let index = build_index(DUMP.as_bytes());
        assert_eq!(index.find_text("twin").unwrap().index, 3);
        assert_eq!(index.find_text("more OPTIONS").unwrap().index, 1);
        assert!(index.find_text("Print to PDF").is_none());
        assert_eq!(index.find_any_text(&["missing", "vault"]).unwrap().index, 0);
    }

    #[test]
    fn test_exact_label_beats_earlier_substring() {
        let dump = r#"<hierarchy>
  <node text="Don't allow" clickable="true" bounds="[0,0][100,50]" />
  <node text=" Allow " clickable="true" bounds="[0,60][100,110]" />
</hierarchy>"#;
        let index = build_index(dump.as_bytes());
        assert_eq!(index.find_text("Allow").unwrap().index, 1);
        assert_eq!(index.find_text("allow").unwrap().index, 1);
        assert_eq!(index.find_text("don't").unwrap().index, 0);
    }

    #[test]
    fn test_needles_are_matched_in_index_order() {
        let dump = r#"<hierarchy>
  <node text="New note" clickable="true" bounds="[0,0][100,50]" />
  <node text="Create new note" clickable="true" bounds="[0,60][100,110]" />
</hierarchy>"#;
        let index = build_index(dump.as_bytes());
        assert_eq!(index.find_any_text(&["Create new note", "New note"]).unwrap().index, 0);
        assert!(index.find_any_text(&["", "  "]).is_none());
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(parse_bounds("[0,0][10,20]"), Some((0, 0, 10, 20)));
        assert_eq!(parse_bounds("[0,0][0,20]"), None);
        assert_eq!(parse_bounds("[0,0][10]"), None);
        assert_eq!(parse_bounds(""), None);
        assert_eq!(parse_bounds("[a,b][c,d]"), None);
    }

    #[test]
    fn test_malformed_or_missing_snapshot_is_empty() {
        assert!(build_index(b"").is_empty());
        assert!(build_index(b"ERROR: null root node returned by UiTestAutomationBridge.").is_empty());
        assert!(build_index(&[0xff, 0xfe, 0x00]).is_empty());
        assert!(load_index(Path::new("/nonexistent/window_dump.xml")).is_empty());
    }

    #[test]
    fn test_truncated_dump_keeps_complete_nodes() {
        let truncated = &DUMP[..DUMP.find("Notes &amp;").unwrap()];
        let index = build_index(truncated.as_bytes());
        assert_eq!(index.len(), 2);
    }
}
