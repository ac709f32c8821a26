// Lazarus Layout Grammar
//
// Parses tmux window layout descriptors such as
// `b25d,80x24,0,0{40x24,0,0,1,39x24,41,0,2}` into a split tree.
//
// ```text
// layout := checksum "," node
// node   := dims "," pane_id
//         | dims "{" node ("," node)* "}"     side by side (columns)
//         | dims "[" node ("," node)* "]"     stacked (rows)
// dims   := W "x" H "," X "," Y
// ```
//
// Parsing is pure and reentrant. Any structural violation yields `None`.

use serde::{Deserialize, Serialize};

/// How a layout cell divides its area between children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// Leaf cell holding exactly one pane
    None,
    /// `{}` children laid out left to right, divided by vertical lines
    SideBySide,
    /// `[]` children laid out top to bottom, divided by horizontal lines
    Stacked,
}

/// Direction handed to the multiplexer when creating a pane by splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDirection {
    /// New pane to the right of the target (`split-window -h`)
    Horizontal,
    /// New pane below the target (`split-window -v`)
    Vertical,
}

impl SplitDirection {
    pub fn tmux_flag(&self) -> &'static str {
        match self {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        }
    }
}

impl SplitKind {
    /// Split action that recreates a cell of this kind.
    ///
    /// Side-by-side cells are columns and must be produced by a horizontal
    /// split; stacked cells are rows and need a vertical split. Leaves have
    /// no split.
    pub fn direction(&self) -> Option<SplitDirection> {
        match self {
            SplitKind::None => None,
            SplitKind::SideBySide => Some(SplitDirection::Horizontal),
            SplitKind::Stacked => Some(SplitDirection::Vertical),
        }
    }
}

/// One cell of a parsed layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub split: SplitKind,
    /// Pane number for leaves, `None` for split cells
    pub pane_id: Option<u32>,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    pub fn is_leaf(&self) -> bool {
        self.split == SplitKind::None
    }

    /// Number of panes below this cell.
    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(LayoutNode::leaf_count).sum()
        }
    }

    /// Pane numbers in depth-first order.
    pub fn pane_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        self.collect_pane_ids(&mut ids);
        ids
    }

    fn collect_pane_ids(&self, out: &mut Vec<u32>) {
        match self.pane_id {
            Some(id) if self.is_leaf() => out.push(id),
            _ => {
                for child in &self.children {
                    child.collect_pane_ids(out);
                }
            }
        }
    }
}

/// Parse a raw layout descriptor.
///
/// Returns `None` on empty input, a missing or non-hex checksum, or any
/// malformed node (missing comma, non-digit where digits are expected,
/// unterminated bracket, trailing input after the root cell) or splits
/// nested deeper than [`MAX_LAYOUT_DEPTH`].
pub fn parse(raw: &str) -> Option<LayoutNode> {
    let raw = raw.trim();
    let (checksum, body) = raw.split_once(',')?;
    if checksum.is_empty() || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let mut cursor = Cursor::new(body);
    let root = cursor.node()?;
    if !cursor.at_end() {
        return None;
    }
    Some(root)
}

/// Leaf count of an optional tree; zero when the layout did not parse.
pub fn leaf_count(tree: Option<&LayoutNode>) -> usize {
    tree.map(LayoutNode::leaf_count).unwrap_or(0)
}

/// Deepest split nesting accepted; tmux never gets near it.
pub const MAX_LAYOUT_DEPTH: usize = 256;

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> Option<()> {
        if self.peek()? == expected {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn node(&mut self) -> Option<LayoutNode> {
        let width = self.number()?;
        self.eat(b'x')?;
        let height = self.number()?;
        self.eat(b',')?;
        let x = self.number()?;
        self.eat(b',')?;
        let y = self.number()?;

        let (split, close) = match self.peek()? {
            b',' => {
                self.pos += 1;
                let pane_id = self.number()?;
                return Some(LayoutNode {
                    width,
                    height,
                    x,
                    y,
                    split: SplitKind::None,
                    pane_id: Some(pane_id),
                    children: Vec::new(),
                });
            }
            b'{' => (SplitKind::SideBySide, b'}'),
            b'[' => (SplitKind::Stacked, b']'),
            _ => return None,
        };
        self.pos += 1;

        if self.depth >= MAX_LAYOUT_DEPTH {
            return None;
        }
        self.depth += 1;
        let mut children = vec![self.node()?];
        loop {
            match self.peek()? {
                b',' => {
                    self.pos += 1;
                    children.push(self.node()?);
                }
                b if b == close => {
                    self.pos += 1;
                    break;
                }
                _ => return None,
            }
        }
        self.depth -= 1;

        Some(LayoutNode {
            width,
            height,
            x,
            y,
            split,
            pane_id: None,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pane() {
        let tree = parse("b25d,80x24,0,0,1").unwrap();
        assert!(tree.is_leaf());
        assert_eq!(tree.pane_id, Some(1));
        assert_eq!((tree.width, tree.height), (80, 24));
        assert_eq!(leaf_count(Some(&tree)), 1);
    }

    #[test]
    fn test_side_by_side() {
        let tree = parse("5e02,80x24,0,0{40x24,0,0,1,39x24,41,0,2}").unwrap();
        assert_eq!(tree.split, SplitKind::SideBySide);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.pane_ids(), vec![1, 2]);
        assert_eq!(tree.children[1].x, 41);
    }

    #[test]
    fn test_stacked() {
        let tree = parse("a1b2,80x24,0,0[80x12,0,0,3,80x11,0,13,4]").unwrap();
        assert_eq!(tree.split, SplitKind::Stacked);
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn test_nested_layout() {
        let raw = "d3c1,200x50,0,0{100x50,0,0,0,99x50,101,0[99x25,101,0,1,99x24,101,26{49x24,101,26,2,49x24,151,26,3}]}";
        let tree = parse(raw).unwrap();
        assert_eq!(tree.leaf_count(), 4);
        assert_eq!(tree.pane_ids(), vec![0, 1, 2, 3]);
        assert_eq!(tree.children[1].split, SplitKind::Stacked);
        assert_eq!(tree.children[1].children[1].split, SplitKind::SideBySide);
    }

    #[test]
    fn test_leaf_count_matches_pane_tokens() {
        let cases = [
            ("aaaa,10x10,0,0,7", 1),
            ("aaaa,10x10,0,0{5x10,0,0,1,4x10,6,0,2}", 2),
            ("aaaa,10x10,0,0{3x10,0,0,1,3x10,4,0,2,2x10,8,0,3}", 3),
            ("aaaa,10x10,0,0[10x5,0,0,1,10x4,0,6{5x4,0,6,2,4x4,6,6,3}]", 3),
        ];
        for (raw, expected) in cases {
            assert_eq!(leaf_count(parse(raw).as_ref()), expected, "{raw}");
        }
    }

    #[test]
    fn test_malformed_inputs_return_none() {
        let cases = [
            "",
            "   ",
            "no commas here",
            "zzzz,80x24,0,0,1",
            ",80x24,0,0,1",
            "b25d,",
            "b25d,80x24,0,0",
            "b25d,80x24,0,0,",
            "b25d,80x,0,0,1",
            "b25d,80x24,0,0{40x24,0,0,1,39x24,41,0,2",
            "b25d,80x24,0,0{40x24,0,0,1,39x24,41,0,2]",
            "b25d,80x24,0,0[40x24,0,0,1}",
            "b25d,80x24,0,0{}",
            "b25d,80x24,0,0,1garbage",
            "b25d,80x24,0,0,1,2",
            "b25d,80x24,0,0{40x24,0,0,a}",
        ];
        for raw in cases {
            assert!(parse(raw).is_none(), "expected None for {raw:?}");
        }
        assert_eq!(leaf_count(None), 0);

        let levels = 200_000;
        let deep = format!(
            "aaaa,{}1x1,0,0,1{}",
            "1x1,0,0{".repeat(levels),
            "}".repeat(levels)
        );
        assert!(parse(&deep).is_none());
    }

    #[test]
    fn test_nesting_up_to_the_limit_parses() {
        let levels = MAX_LAYOUT_DEPTH;
        let raw = format!(
            "aaaa,{}1x1,0,0,7{}",
            "1x1,0,0[".repeat(levels),
            "]".repeat(levels)
        );
        let tree = parse(&raw).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.pane_ids(), vec![7]);

        let one_more = format!(
            "aaaa,{}1x1,0,0,7{}",
            "1x1,0,0[".repeat(levels + 1),
            "]".repeat(levels + 1)
        );
        assert!(parse(&one_more).is_none());
    }

    #[test]
    fn test_split_mapping_is_fixed() {
        assert_eq!(
            SplitKind::SideBySide.direction(),
            Some(SplitDirection::Horizontal)
        );
        assert_eq!(SplitKind::Stacked.direction(), Some(SplitDirection::Vertical));
        assert_eq!(SplitKind::None.direction(), None);
        assert_eq!(SplitDirection::Horizontal.tmux_flag(), "-h");
    }
}
