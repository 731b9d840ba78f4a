//! Textual persistence for [`TernaryTree`].
//!
//! A tree is serialized as a stream of marker-prefixed records, one per
//! node, in depth-first pre-order (self, smaller, greater, next):
//!
//! ```text
//! <#> node <id>
//! <#> from <parent_id>
//! <#> link <0|1|2|3>
//! <#> op <token text, may contain whitespace>
//! <#> data <payload text, may be empty>
//! <#> end
//! ```
//!
//! Ids are sequential in emission order; link tags are 0=root, 1=smaller,
//! 2=greater, 3=next. The root record carries `from 0` even though 0 is
//! also the first real id, so a reader must key off the `link 0` tag and
//! never off the id value. The stream is whitespace-tokenized: `op` and
//! `data` fields run until the next `<#>` marker and are rejoined with
//! single spaces, so token and payload text must not contain the marker
//! itself (and must survive whitespace normalization). An empty `data`
//! field means the node stores no payload, so payload text must be
//! non-empty.
//!
//! Token and payload representations are the caller's: every entry point
//! takes a pair of pure conversion functions, and nothing outside this
//! codec ever calls them.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::iter::Peekable;
use std::path::Path;

use log::warn;
use thiserror::Error;

use crate::{Link, NodeId, ParentLink, TernaryTree};

const MARKER: &str = "<#>";

/// A malformed record stream.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ParseError {
    /// The input ended in the middle of a record field.
    #[error("unexpected end of input inside a record")]
    UnexpectedEof,
    /// A numeric field held something other than an integer.
    #[error("field `{field}` holds `{text}`, expected an integer")]
    InvalidNumber { field: &'static str, text: String },
    /// A record carried a link tag outside 0..=3.
    #[error("record {record} carries unknown link tag {tag}")]
    UnknownLinkTag { record: usize, tag: u32 },
    /// A record named a parent id that no earlier record defined.
    #[error("record {record} names parent {parent}, but only {known} records were seen")]
    UnknownParent {
        record: usize,
        parent: u32,
        known: usize,
    },
    /// More than one record carried the root link tag.
    #[error("record {record} is a second root record")]
    DuplicateRoot { record: usize },
    /// Two records claimed the same child slot of one parent.
    #[error("record {record} rewires the already-wired {link} slot of record {parent}")]
    DuplicateChild {
        record: usize,
        parent: u32,
        link: Link,
    },
}

fn link_tag(link: Link) -> u32 {
    match link {
        Link::Smaller => 1,
        Link::Greater => 2,
        Link::Next => 3,
    }
}

fn parse_u32<'a, I>(tokens: &mut Peekable<I>, field: &'static str) -> Result<u32, ParseError>
where
    I: Iterator<Item = &'a str>,
{
    let text = tokens.next().ok_or(ParseError::UnexpectedEof)?;
    text.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        text: text.to_string(),
    })
}

/// Collects tokens up to (not including) the next marker, rejoined with
/// single spaces. Empty when the marker follows immediately.
fn collect_text<'a, I>(tokens: &mut Peekable<I>) -> String
where
    I: Iterator<Item = &'a str>,
{
    let mut text = String::new();
    while let Some(&tok) = tokens.peek() {
        if tok == MARKER {
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(tok);
        tokens.next();
    }
    text
}

impl<T, P> TernaryTree<T, P> {
    /// Serializes the tree into `out`, one record per node in depth-first
    /// pre-order. An empty tree writes nothing.
    pub fn save_to_writer<W: Write>(
        &self,
        out: &mut W,
        token_to_text: impl Fn(&T) -> String,
        payload_to_text: impl Fn(&P) -> String,
    ) -> io::Result<()> {
        let Some(root) = self.root else {
            return Ok(());
        };
        // Explicit stack: a key of length N produces a next-chain of depth N.
        let mut stack: Vec<(NodeId, u32, u32)> = vec![(root, 0, 0)];
        let mut next_id = 0u32;
        while let Some((id, from, tag)) = stack.pop() {
            let node = self.node(id);
            let record = next_id;
            next_id += 1;
            writeln!(out, "{MARKER} node {record}")?;
            writeln!(out, "{MARKER} from {from}")?;
            writeln!(out, "{MARKER} link {tag}")?;
            writeln!(out, "{MARKER} op {}", token_to_text(&node.token))?;
            match &node.payload {
                Some(p) => writeln!(out, "{MARKER} data {}", payload_to_text(p))?,
                None => writeln!(out, "{MARKER} data")?,
            }
            writeln!(out, "{MARKER} end")?;
            writeln!(out)?;
            // Pushed in reverse so the smaller subtree is emitted first.
            if let Some(n) = node.next {
                stack.push((n, record, link_tag(Link::Next)));
            }
            if let Some(g) = node.greater {
                stack.push((g, record, link_tag(Link::Greater)));
            }
            if let Some(s) = node.smaller {
                stack.push((s, record, link_tag(Link::Smaller)));
            }
        }
        Ok(())
    }

    /// Serializes the tree into a `String`.
    pub fn save_to_string(
        &self,
        token_to_text: impl Fn(&T) -> String,
        payload_to_text: impl Fn(&P) -> String,
    ) -> String {
        let mut buf = Vec::new();
        self.save_to_writer(&mut buf, token_to_text, payload_to_text)
            .expect("writing to a Vec<u8> cannot fail");
        String::from_utf8(buf).expect("records are valid UTF-8")
    }

    /// Serializes the tree to a file.
    ///
    /// An unwritable path is a logged no-op: callers needing I/O failure
    /// visibility should use [`save_to_writer`](Self::save_to_writer).
    pub fn save_to_file(
        &self,
        path: impl AsRef<Path>,
        token_to_text: impl Fn(&T) -> String,
        payload_to_text: impl Fn(&P) -> String,
    ) {
        let path = path.as_ref();
        let file = match File::create(path) {
            Ok(file) => file,
            Err(err) => {
                warn!("save to {} skipped: {err}", path.display());
                return;
            }
        };
        let mut out = BufWriter::new(file);
        let result = self
            .save_to_writer(&mut out, token_to_text, payload_to_text)
            .and_then(|()| out.flush());
        if let Err(err) = result {
            warn!("save to {} failed: {err}", path.display());
        }
    }

    /// Replaces the tree's contents with the records in `input`, rebuilding
    /// parent links and re-deriving the weight counters from the payloads it
    /// carries. Leaves the cursor on the new root.
    pub fn load_from_str(
        &mut self,
        input: &str,
        text_to_token: impl Fn(&str) -> T,
        text_to_payload: impl Fn(&str) -> P,
    ) -> Result<(), ParseError> {
        self.clear();
        let mut tokens = input.split_whitespace().peekable();
        // Record ids are implicit in arrival order; `from` indexes this list.
        let mut ids: Vec<NodeId> = Vec::new();
        let mut from = 0u32;
        let mut tag = 0u32;
        let mut op_text = String::new();
        let mut data_text = String::new();

        while let Some(tok) = tokens.next() {
            if tok != MARKER {
                continue;
            }
            let field = tokens.next().ok_or(ParseError::UnexpectedEof)?;
            match field {
                // The id field only echoes the record's position.
                "node" => {
                    parse_u32(&mut tokens, "node")?;
                }
                "from" => from = parse_u32(&mut tokens, "from")?,
                "link" => tag = parse_u32(&mut tokens, "link")?,
                "op" => op_text = collect_text(&mut tokens),
                "data" => data_text = collect_text(&mut tokens),
                "end" => {
                    let record = ids.len();
                    let id = match tag {
                        // The root record also says `from 0`; only the tag
                        // distinguishes it from a child of record 0.
                        0 => {
                            if self.root.is_some() {
                                return Err(ParseError::DuplicateRoot { record });
                            }
                            let id = self.alloc(text_to_token(&op_text), ParentLink::Root);
                            self.root = Some(id);
                            id
                        }
                        1..=3 => {
                            let link = match tag {
                                1 => Link::Smaller,
                                2 => Link::Greater,
                                _ => Link::Next,
                            };
                            let parent =
                                *ids.get(from as usize).ok_or(ParseError::UnknownParent {
                                    record,
                                    parent: from,
                                    known: ids.len(),
                                })?;
                            if self.node(parent).child(link).is_some() {
                                return Err(ParseError::DuplicateChild {
                                    record,
                                    parent: from,
                                    link,
                                });
                            }
                            let id = self
                                .alloc(text_to_token(&op_text), ParentLink::Child(parent, link));
                            *self.node_mut(parent).child_mut(link) = Some(id);
                            id
                        }
                        other => return Err(ParseError::UnknownLinkTag { record, tag: other }),
                    };
                    if !data_text.is_empty() {
                        self.node_mut(id).payload = Some(text_to_payload(&data_text));
                        self.payload_count += 1;
                        self.propagate_weight(id, 1);
                    }
                    ids.push(id);
                    from = 0;
                    tag = 0;
                    op_text.clear();
                    data_text.clear();
                }
                // Unknown fields are skipped, like any other loose text.
                _ => {}
            }
        }
        self.cursor = self.root;
        Ok(())
    }

    /// Replaces the tree's contents with the records in the file at `path`.
    ///
    /// An unreadable or malformed file is a logged empty result: callers
    /// needing failure visibility should use
    /// [`load_from_str`](Self::load_from_str).
    pub fn load_from_file(
        &mut self,
        path: impl AsRef<Path>,
        text_to_token: impl Fn(&str) -> T,
        text_to_payload: impl Fn(&str) -> P,
    ) {
        let path = path.as_ref();
        self.clear();
        let input = match fs::read_to_string(path) {
            Ok(input) => input,
            Err(err) => {
                warn!("load from {} skipped: {err}", path.display());
                return;
            }
        };
        if let Err(err) = self.load_from_str(&input, text_to_token, text_to_payload) {
            warn!("load from {} discarded: {err}", path.display());
            self.clear();
        }
    }
}
