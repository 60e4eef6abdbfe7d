//! Part writing.
//!
//! Streams a contiguous page range out of the open source document into a
//! new PDF. Pages are copied one at a time: the cancellation token is
//! polled before each page and a progress event is emitted after each page,
//! so cancellation latency is bounded by one page copy.
//!
//! Copying a page means copying its object graph. Every object reachable
//! from the page dictionary is cloned into the destination under a fresh id
//! (an old-to-new id map keeps shared resources shared and breaks cycles).
//! References back into the source page tree are severed, otherwise one
//! page would drag every sibling along; inheritable page attributes are
//! resolved from the source tree and pinned onto the copied page first.

use crate::cancel::CancellationToken;
use crate::document::SourceDocument;
use crate::progress::{Event, EventSender};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

/// Page attributes a PDF page may inherit from its ancestors.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Part writing error types
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cancelled")]
    Cancelled,

    #[error("page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    #[error("PDF structure error: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WriteError>;

/// Everything a single part write needs to report progress and observe
/// cancellation.
pub struct WriteContext<'a> {
    pub token: &'a CancellationToken,
    pub events: &'a EventSender,
    /// 0-based index of the part being written.
    pub part_index: usize,
    pub total_parts: usize,
    /// Pages already written by earlier parts (global progress offset).
    pub page_offset: usize,
    pub total_pages: usize,
    pub remove_images: bool,
}

/// Copy pages `[range.start, range.end)` from `source` into a new PDF at
/// `dest`. Any partial output is removed when the write fails or is
/// cancelled.
pub fn write_part(
    source: &SourceDocument,
    range: Range<usize>,
    dest: &Path,
    ctx: &WriteContext<'_>,
) -> Result<()> {
    let result = write_part_inner(source, range, dest, ctx);
    if result.is_err() && dest.exists() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

fn write_part_inner(
    source: &SourceDocument,
    range: Range<usize>,
    dest: &Path,
    ctx: &WriteContext<'_>,
) -> Result<()> {
    let mut copier = PageCopier::new(source.raw(), ctx.remove_images);
    let start = range.start;

    for page_index in range {
        if ctx.token.is_cancelled() {
            return Err(WriteError::Cancelled);
        }

        let page_id = source
            .page_id(page_index)
            .ok_or_else(|| WriteError::PageOutOfRange {
                index: page_index,
                count: source.page_count(),
            })?;
        copier.copy_page(page_id)?;

        ctx.events.send(Event::Progress {
            current_page: ctx.page_offset + (page_index - start) + 1,
            total_pages: ctx.total_pages,
            current_part: ctx.part_index + 1,
            total_parts: ctx.total_parts,
            status: format!("Writing part {}/{}", ctx.part_index + 1, ctx.total_parts),
            bytes_written: None,
        });
    }

    let mut document = copier.finish();
    document
        .save(dest)
        .map_err(|e| WriteError::Pdf(e.to_string()))?;
    Ok(())
}

/// Incremental page-graph copier from one source document into a fresh one.
struct PageCopier<'a> {
    src: &'a Document,
    dst: Document,
    id_map: BTreeMap<ObjectId, ObjectId>,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    remove_images: bool,
    image_placeholder: Option<ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(src: &'a Document, remove_images: bool) -> Self {
        let mut dst = Document::with_version(src.version.clone());
        let pages_id = dst.new_object_id();
        Self {
            src,
            dst,
            id_map: BTreeMap::new(),
            pages_id,
            kids: Vec::new(),
            remove_images,
            image_placeholder: None,
        }
    }

    /// Copy one page and everything it references.
    fn copy_page(&mut self, page_id: ObjectId) -> Result<()> {
        let mut page_dict = self
            .src
            .get_dictionary(page_id)
            .map_err(|e| WriteError::Pdf(e.to_string()))?
            .clone();

        // Pin inherited attributes before the page leaves its tree.
        for key in INHERITABLE_KEYS {
            if !page_dict.has(key) {
                if let Some(value) = self.inherited_attr(&page_dict, key) {
                    page_dict.set(key.to_vec(), value);
                }
            }
        }
        if !page_dict.has(b"MediaBox") {
            // A page without any MediaBox anywhere; fall back to A4.
            page_dict.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(595.0),
                    Object::Real(842.0),
                ]),
            );
        }

        let new_id = self.reserve_id();
        self.id_map.insert(page_id, new_id);

        let mut rewritten = self.rewrite_dict(&page_dict)?;
        rewritten.set("Parent", Object::Reference(self.pages_id));
        self.dst.objects.insert(new_id, Object::Dictionary(rewritten));
        self.kids.push(new_id);
        Ok(())
    }

    /// Walk the source page tree upwards looking for an inheritable key.
    fn inherited_attr(&self, page_dict: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut parent_id = page_dict.get(b"Parent").ok()?.as_reference().ok()?;
        loop {
            let dict = self.src.get_dictionary(parent_id).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
            parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        }
    }

    fn reserve_id(&mut self) -> ObjectId {
        self.dst.max_id += 1;
        (self.dst.max_id, 0)
    }

    /// Copy a referenced object, memoized through the id map.
    fn copy_object(&mut self, id: ObjectId) -> Result<ObjectId> {
        if let Some(&mapped) = self.id_map.get(&id) {
            return Ok(mapped);
        }

        let new_id = self.reserve_id();
        // Map before recursing so reference cycles terminate.
        self.id_map.insert(id, new_id);

        let object = self
            .src
            .get_object(id)
            .map_err(|e| WriteError::Pdf(e.to_string()))?
            .clone();
        let rewritten = self.rewrite(object)?;
        self.dst.objects.insert(new_id, rewritten);
        Ok(new_id)
    }

    /// Rewrite an object for the destination, translating references.
    fn rewrite(&mut self, object: Object) -> Result<Object> {
        Ok(match object {
            Object::Reference(id) => {
                if self.is_page_tree_node(id) {
                    // A stray link back into the source page tree (Parent,
                    // annotation destinations). Copying it would pull every
                    // page in the document.
                    Object::Null
                } else if self.remove_images && self.is_image_stream(id) {
                    Object::Reference(self.image_placeholder())
                } else {
                    Object::Reference(self.copy_object(id)?)
                }
            }
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.rewrite(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.rewrite_dict(&dict)?),
            Object::Stream(stream) => {
                let dict = self.rewrite_dict(&stream.dict)?;
                let mut copied = Stream::new(dict, stream.content.clone());
                copied.allows_compression = stream.allows_compression;
                Object::Stream(copied)
            }
            other => other,
        })
    }

    fn rewrite_dict(&mut self, dict: &Dictionary) -> Result<Dictionary> {
        let mut rewritten = Dictionary::new();
        for (key, value) in dict.iter() {
            let value = self.rewrite(value.clone())?;
            rewritten.set(key.clone(), value);
        }
        Ok(rewritten)
    }

    fn is_page_tree_node(&self, id: ObjectId) -> bool {
        let Ok(dict) = self.src.get_dictionary(id) else {
            return false;
        };
        matches!(
            dict.get(b"Type"),
            Ok(Object::Name(name)) if name == b"Page" || name == b"Pages"
        )
    }

    fn is_image_stream(&self, id: ObjectId) -> bool {
        let Ok(Object::Stream(stream)) = self.src.get_object(id) else {
            return false;
        };
        matches!(
            stream.dict.get(b"Subtype"),
            Ok(Object::Name(name)) if name == b"Image"
        )
    }

    /// Minimal 1x1 grayscale image standing in for stripped images, so
    /// content streams that paint them stay valid.
    fn image_placeholder(&mut self) -> ObjectId {
        if let Some(id) = self.image_placeholder {
            return id;
        }
        let stream = Stream::new(
            Dictionary::from_iter(vec![
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Image".to_vec())),
                ("Width", Object::Integer(1)),
                ("Height", Object::Integer(1)),
                ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
                ("BitsPerComponent", Object::Integer(8)),
            ]),
            vec![0xff],
        );
        let id = self.dst.add_object(stream);
        self.image_placeholder = Some(id);
        id
    }

    /// Assemble the page tree and catalog around the copied pages.
    fn finish(mut self) -> Document {
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(self.kids.len() as i64)),
            (
                "Kids",
                Object::Array(
                    self.kids
                        .iter()
                        .map(|id| Object::Reference(*id))
                        .collect(),
                ),
            ),
        ]);
        self.dst
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.dst.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.dst.trailer.set("Root", Object::Reference(catalog_id));
        self.dst.compress();
        self.dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghostscript::Ghostscript;
    use crate::progress::{EventChannel, NullSink, ProgressReporter, ProgressSink};
    use crate::test_pdf::write_test_pdf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct CollectingSink(Arc<Mutex<Vec<Event>>>);

    impl ProgressSink for CollectingSink {
        fn emit(&mut self, event: Event) {
            self.0.lock().expect("lock poisoned").push(event);
        }
    }

    fn open_fixture(dir: &Path, pages: u32) -> SourceDocument {
        let path = dir.join("source.pdf");
        write_test_pdf(&path, pages);
        SourceDocument::open(&path, None::<&Ghostscript>, &CancellationToken::new()).unwrap()
    }

    fn unthrottled_channel(
        sink: Box<dyn ProgressSink>,
    ) -> (crate::progress::EventSender, EventChannel) {
        EventChannel::spawn(ProgressReporter::with_throttle(sink, Duration::ZERO))
    }

    #[test]
    fn test_writes_page_range() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 10);
        let dest = dir.path().join("part.pdf");

        let token = CancellationToken::new();
        let (events, channel) = unthrottled_channel(Box::new(NullSink));
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 0,
            total_parts: 1,
            page_offset: 0,
            total_pages: 10,
            remove_images: false,
        };

        write_part(&source, 2..6, &dest, &ctx).unwrap();
        drop(events);
        channel.join();

        let reloaded = Document::load(&dest).unwrap();
        assert_eq!(reloaded.get_pages().len(), 4);
    }

    #[test]
    fn test_emits_one_progress_event_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 6);
        let dest = dir.path().join("part.pdf");

        let collected = Arc::new(Mutex::new(Vec::new()));
        let (events, channel) = unthrottled_channel(Box::new(CollectingSink(collected.clone())));
        let token = CancellationToken::new();
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 1,
            total_parts: 2,
            page_offset: 3,
            total_pages: 6,
            remove_images: false,
        };

        write_part(&source, 3..6, &dest, &ctx).unwrap();
        drop(events);
        channel.join();

        let delivered = collected.lock().unwrap();
        assert_eq!(delivered.len(), 3);
        // Global page numbering continues from the offset; part number is 1-based.
        assert_eq!(
            delivered[0],
            Event::Progress {
                current_page: 4,
                total_pages: 6,
                current_part: 2,
                total_parts: 2,
                status: "Writing part 2/2".to_string(),
                bytes_written: None,
            }
        );
        assert!(matches!(
            delivered[2],
            Event::Progress { current_page: 6, .. }
        ));
    }

    #[test]
    fn test_cancellation_before_first_page_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 5);
        let dest = dir.path().join("part.pdf");

        let token = CancellationToken::new();
        token.cancel();
        let (events, channel) = unthrottled_channel(Box::new(NullSink));
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 0,
            total_parts: 1,
            page_offset: 0,
            total_pages: 5,
            remove_images: false,
        };

        let result = write_part(&source, 0..5, &dest, &ctx);
        drop(events);
        channel.join();

        assert!(matches!(result, Err(WriteError::Cancelled)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_copied_part_is_self_contained() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 8);
        let dest = dir.path().join("part.pdf");

        let token = CancellationToken::new();
        let (events, channel) = unthrottled_channel(Box::new(NullSink));
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 0,
            total_parts: 1,
            page_offset: 0,
            total_pages: 8,
            remove_images: false,
        };

        write_part(&source, 0..3, &dest, &ctx).unwrap();
        drop(events);
        channel.join();

        // The part must parse on its own and expose its pages' shared
        // resources without dangling references.
        let reloaded = Document::load(&dest).unwrap();
        let pages = reloaded.get_pages();
        assert_eq!(pages.len(), 3);
        for (_, page_id) in pages {
            let dict = reloaded.get_dictionary(page_id).unwrap();
            assert!(dict.has(b"MediaBox") || dict.has(b"Parent"));
            let resources = dict.get(b"Resources").unwrap();
            let resources = match resources {
                Object::Reference(id) => reloaded.get_dictionary(*id).unwrap(),
                Object::Dictionary(d) => d,
                other => panic!("unexpected resources object: {:?}", other),
            };
            assert!(resources.has(b"Font"));
        }
    }

    #[test]
    fn test_remove_images_keeps_part_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 4);
        let dest = dir.path().join("part.pdf");

        let token = CancellationToken::new();
        let (events, channel) = unthrottled_channel(Box::new(NullSink));
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 0,
            total_parts: 1,
            page_offset: 0,
            total_pages: 4,
            remove_images: true,
        };

        write_part(&source, 0..4, &dest, &ctx).unwrap();
        drop(events);
        channel.join();

        let reloaded = Document::load(&dest).unwrap();
        assert_eq!(reloaded.get_pages().len(), 4);
    }

    #[test]
    fn test_empty_range_produces_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let source = open_fixture(dir.path(), 3);
        let dest = dir.path().join("part.pdf");

        let token = CancellationToken::new();
        let (events, channel) = unthrottled_channel(Box::new(NullSink));
        let ctx = WriteContext {
            token: &token,
            events: &events,
            part_index: 0,
            total_parts: 1,
            page_offset: 0,
            total_pages: 3,
            remove_images: false,
        };

        write_part(&source, 1..1, &dest, &ctx).unwrap();
        drop(events);
        channel.join();

        let reloaded = Document::load(&dest).unwrap();
        assert_eq!(reloaded.get_pages().len(), 0);
    }
}
