use regex_lite::Regex;

/// Boundary markers for one interactive debugger dialect.
///
/// The debugger's line-oriented protocol has no framing or length prefix; the
/// only reliable boundaries in its output stream are the ready prompt (idle,
/// awaiting the next command) and the pager continuation prompt (paginated
/// output awaiting an acknowledgment). Backends with other prompt conventions
/// substitute their own marker set via [`PromptMarkers::new`].
#[derive(Debug, Clone)]
pub struct PromptMarkers {
    ready: Regex,
    pager: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkerKind {
    Ready,
    Pager,
}

/// One marker occurrence inside the accumulated output buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MarkerMatch {
    pub(crate) kind: MarkerKind,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl PromptMarkers {
    pub fn new(ready: &str, pager: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            ready: Regex::new(ready)?,
            pager: Regex::new(pager)?,
        })
    }

    /// Marker set for GDB: the `(gdb)` ready prompt and the
    /// `--Type <return> to continue ...--` pager prompt.
    pub fn gdb() -> Self {
        match Self::new(r"\(gdb\)", r"--Type <return> to continue.*--") {
            Ok(markers) => markers,
            Err(_) => unreachable!("gdb marker patterns are valid regexes"),
        }
    }

    /// Earliest marker occurrence in `buffer`; the ready prompt wins ties.
    pub(crate) fn scan(&self, buffer: &str) -> Option<MarkerMatch> {
        let ready = self.ready.find(buffer).map(|m| MarkerMatch {
            kind: MarkerKind::Ready,
            start: m.start(),
            end: m.end(),
        });
        let pager = self.pager.find(buffer).map(|m| MarkerMatch {
            kind: MarkerKind::Pager,
            start: m.start(),
            end: m.end(),
        });
        match (ready, pager) {
            (Some(ready), Some(pager)) if pager.start < ready.start => Some(pager),
            (Some(ready), _) => Some(ready),
            (None, pager) => pager,
        }
    }
}
