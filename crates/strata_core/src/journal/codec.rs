//! Little-endian payload primitives shared by the record encoders.

use crate::error::{CoreError, CoreResult};
use crate::types::{Node, NodeId};

const NODE_ELEMENT: u8 = 1;
const NODE_TEXT: u8 = 2;

/// Appends payload fields to a byte buffer.
#[derive(Debug, Default)]
pub(crate) struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub(crate) fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub(crate) fn str(&mut self, s: &str) -> CoreResult<&mut Self> {
        let len = u32::try_from(s.len())
            .map_err(|_| CoreError::invalid_format("string longer than u32::MAX"))?;
        self.u32(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(self)
    }

    pub(crate) fn node_id(&mut self, id: &NodeId) -> &mut Self {
        // NodeId guarantees 1..=255 levels
        self.u8(id.level() as u8);
        for level in id.levels() {
            self.u32(*level);
        }
        self
    }

    pub(crate) fn node(&mut self, node: &Node) -> CoreResult<&mut Self> {
        match node {
            Node::Element { name, children } => {
                self.u8(NODE_ELEMENT).str(name)?.u32(*children);
            }
            Node::Text { value } => {
                self.u8(NODE_TEXT).str(value)?;
            }
        }
        Ok(self)
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads payload fields, failing on truncation.
#[derive(Debug)]
pub(crate) struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CoreError::invalid_format("unexpected end of payload"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> CoreResult<u32> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| CoreError::invalid_format("invalid u32"))?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn u64(&mut self) -> CoreResult<u64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| CoreError::invalid_format("invalid u64"))?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub(crate) fn string(&mut self) -> CoreResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::invalid_format("string is not valid UTF-8"))
    }

    pub(crate) fn node_id(&mut self) -> CoreResult<NodeId> {
        let count = self.u8()? as usize;
        let levels = (0..count)
            .map(|_| self.u32())
            .collect::<CoreResult<Vec<_>>>()?;
        NodeId::from_levels(levels)
    }

    pub(crate) fn node(&mut self) -> CoreResult<Node> {
        match self.u8()? {
            NODE_ELEMENT => Ok(Node::Element {
                name: self.string()?,
                children: self.u32()?,
            }),
            NODE_TEXT => Ok(Node::Text {
                value: self.string()?,
            }),
            other => Err(CoreError::invalid_format(format!(
                "unknown node kind {other}"
            ))),
        }
    }

    /// Fails if any bytes remain.
    pub(crate) fn finish(self) -> CoreResult<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(CoreError::invalid_format(format!(
                "{} trailing bytes in payload",
                self.data.len() - self.pos
            )))
        }
    }
}
