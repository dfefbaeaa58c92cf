//! Category chain rendering.
//!
//! A category path such as `"Моточасти > Подвеска > Амортизаторы"` is split
//! into levels and rendered one level per line, with one `!` per depth:
//!
//! ```text
//! category: Моточасти
//! category!: Подвеска
//! category!!: Амортизаторы
//! ```
//!
//! The same markers are requested from the advisory model, so downstream
//! consumers parse both with one convention.

use std::fmt;

use crate::models::CATEGORY_DELIMITER;

/// Label prefix for the root level.
pub const LEVEL_MARKER: &str = "category";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLevel {
    /// 0 is the root.
    pub index: usize,
    pub label: String,
}

impl ChainLevel {
    /// `category`, `category!`, `category!!`, ...
    pub fn marker(&self) -> String {
        format!("{}{}", LEVEL_MARKER, "!".repeat(self.index))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryChain {
    levels: Vec<ChainLevel>,
}

impl CategoryChain {
    /// Split a category path on `>` and trim each level.
    ///
    /// A blank path gives an empty chain.
    pub fn parse(category_path: &str) -> Self {
        if category_path.trim().is_empty() {
            return Self::default();
        }
        let levels = category_path
            .split(CATEGORY_DELIMITER)
            .enumerate()
            .map(|(index, part)| ChainLevel {
                index,
                label: part.trim().to_string(),
            })
            .collect();
        Self { levels }
    }

    pub fn levels(&self) -> &[ChainLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Join the levels back into a path.
    pub fn to_path(&self) -> String {
        let delimiter = CATEGORY_DELIMITER.to_string();
        self.levels
            .iter()
            .map(|l| l.label.as_str())
            .collect::<Vec<_>>()
            .join(delimiter.as_str())
    }

    /// One `marker: label` line per level, each newline-terminated.
    /// Empty for an empty chain.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for level in &self.levels {
            out.push_str(&level.marker());
            out.push_str(": ");
            out.push_str(&level.label);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for CategoryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
