use std::io::{self, BufRead};

use log::warn;

use crate::errors::Result;
use crate::utils;

// Invalid UTF-8 is replaced rather than skipped so that the feature and annotation
// streams stay aligned line by line.
struct LossyLines<R> {
    rdr: R,
    buf: Vec<u8>,
    lineno: usize,
}

impl<R> LossyLines<R>
where
    R: BufRead,
{
    fn new(rdr: R) -> Self {
        Self {
            rdr,
            buf: vec![],
            lineno: 0,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        if !utils::read_line_bytes(&mut self.rdr, &mut self.buf)? {
            return Ok(None);
        }
        self.lineno += 1;
        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(line) => Ok(Some(line)),
            Err(e) => {
                warn!("line {}: {}; invalid bytes are replaced", self.lineno, e.utf8_error());
                Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
        }
    }
}

/// One decision unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    gold: String,
    features: Vec<String>,
    annotation: String,
}

impl Token {
    /// Creates a new token.
    ///
    /// # Arguments
    ///
    /// * `gold` - The reference label.
    /// * `features` - Active feature names. Duplicates are counted each time they appear.
    /// * `annotation` - A string echoed in the output.
    pub fn new<S, F, A>(gold: S, features: Vec<F>, annotation: A) -> Self
    where
        S: Into<String>,
        F: Into<String>,
        A: Into<String>,
    {
        Self {
            gold: gold.into(),
            features: features.into_iter().map(Into::into).collect(),
            annotation: annotation.into(),
        }
    }

    /// Parses a tab-separated feature line: the gold label followed by feature names.
    ///
    /// Returns `None` if the line has no fields.
    pub fn from_line(line: &str, bias_feature: Option<&str>) -> Option<Self> {
        let mut fields = utils::tab_fields(line);
        let gold = fields.next()?.to_string();
        let mut features: Vec<String> = fields.map(str::to_string).collect();
        if let Some(bias) = bias_feature {
            features.push(bias.to_string());
        }
        Some(Self {
            gold,
            features,
            annotation: String::new(),
        })
    }

    pub fn gold(&self) -> &str {
        &self.gold
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    pub fn set_annotation<S>(&mut self, annotation: S)
    where
        S: Into<String>,
    {
        self.annotation = annotation.into();
    }
}

/// Item of a token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A token to label.
    Token(Token),

    /// End of a sequence.
    Boundary,
}

/// Reads tokens from tab-separated feature lines. A blank line ends a sequence.
pub struct TokenReader<R> {
    lines: LossyLines<R>,
    bias_feature: Option<String>,
}

impl<R> TokenReader<R>
where
    R: BufRead,
{
    pub fn new(rdr: R) -> Self {
        Self {
            lines: LossyLines::new(rdr),
            bias_feature: None,
        }
    }

    /// Sets a feature name appended to every token.
    pub fn bias_feature(mut self, bias_feature: Option<String>) -> Self {
        self.bias_feature = bias_feature;
        self
    }
}

impl<R> Iterator for TokenReader<R>
where
    R: BufRead,
{
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next_line() {
            Ok(line) => line?,
            Err(e) => return Some(Err(e.into())),
        };
        let item = Token::from_line(&line, self.bias_feature.as_deref())
            .map_or(Item::Boundary, Item::Token);
        Some(Ok(item))
    }
}

/// Reads the annotation column of an auxiliary file.
///
/// The first line is a header and is discarded. Each subsequent line yields its second
/// tab-separated field; runs of tabs count as one delimiter.
pub struct AnnotationReader<R> {
    lines: LossyLines<R>,
    header_skipped: bool,
}

impl<R> AnnotationReader<R>
where
    R: BufRead,
{
    pub fn new(rdr: R) -> Self {
        Self {
            lines: LossyLines::new(rdr),
            header_skipped: false,
        }
    }

    /// Returns the annotation of the next line.
    ///
    /// An empty string is returned when the line has no second field or the input is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// When the underlying reader generates an error, it will be returned as is.
    pub fn next_annotation(&mut self) -> Result<String> {
        if !self.header_skipped {
            self.header_skipped = true;
            self.lines.next_line()?;
        }
        Ok(self
            .lines
            .next_line()?
            .and_then(|line| utils::tab_fields(&line).nth(1).map(str::to_string))
            .unwrap_or_default())
    }
}

/// Token stream paired line by line with an annotation stream.
pub struct Corpus<R, A> {
    tokens: TokenReader<R>,
    annotations: Option<AnnotationReader<A>>,
}

impl<R, A> Corpus<R, A>
where
    R: BufRead,
    A: BufRead,
{
    /// Creates a corpus.
    ///
    /// # Arguments
    ///
    /// * `tokens` - A token stream.
    /// * `annotations` - An annotation stream aligned with the lines of `tokens`. If
    ///   `None`, every annotation is empty.
    pub fn new(tokens: TokenReader<R>, annotations: Option<AnnotationReader<A>>) -> Self {
        Self {
            tokens,
            annotations,
        }
    }
}

impl<R, A> Iterator for Corpus<R, A>
where
    R: BufRead,
    A: BufRead,
{
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.tokens.next()? {
            Ok(item) => item,
            Err(e) => return Some(Err(e)),
        };
        let annotation = match self.annotations.as_mut().map(AnnotationReader::next_annotation) {
            Some(Ok(annotation)) => annotation,
            Some(Err(e)) => return Some(Err(e)),
            None => String::new(),
        };
        Some(Ok(match item {
            Item::Token(mut token) => {
                token.set_annotation(annotation);
                Item::Token(token)
            }
            Item::Boundary => Item::Boundary,
        }))
    }
}
