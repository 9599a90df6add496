use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// A syntactic token read from a CoNLL-U treebank.
///
/// Token identifiers are implicit: the token at index `i` of a sentence has
/// the 1-based identifier `i + 1`. A `head` of 0 denotes the artificial ROOT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub form: String,
    pub xpos: String,
    pub head: usize,
    pub deprel: String,
}

pub type Sentence = Vec<Token>;

/// An iterator over the sentences in a CoNLL-U fragment.
///
/// Comment lines, multi-word range tokens (ids containing `-`), empty nodes
/// (ids containing `.`) and lines with fewer than eight columns are skipped.
pub struct SentenceIterator<R> {
    read: R,
}

impl<R> SentenceIterator<R>
where
    R: BufRead,
{
    pub fn new(read: R) -> Self {
        SentenceIterator { read }
    }
}

impl<R> Iterator for SentenceIterator<R>
where
    R: BufRead,
{
    type Item = Result<Sentence>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut tokens = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            match self.read.read_line(&mut line) {
                Ok(0) => {
                    if tokens.is_empty() {
                        return None;
                    }
                    return Some(Ok(tokens));
                }
                Ok(_) => (),
                Err(err) => return Some(Err(err.into())),
            }

            let trimmed = line.trim_end_matches(|c| c == '\n' || c == '\r');

            if trimmed.trim().is_empty() {
                if !tokens.is_empty() {
                    return Some(Ok(tokens));
                }
                continue;
            }

            if trimmed.starts_with('#') {
                continue;
            }

            if let Some(token) = parse_token(trimmed) {
                tokens.push(token);
            }
        }
    }
}

fn parse_token(line: &str) -> Option<Token> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < 8 {
        return None;
    }

    let id = columns[0];
    if id.contains('-') || id.contains('.') || id.parse::<usize>().is_err() {
        return None;
    }

    let head = columns[6].parse::<usize>().ok()?;

    Some(Token {
        form: columns[1].to_owned(),
        xpos: columns[4].to_owned(),
        head,
        deprel: columns[7].to_owned(),
    })
}

/// Locate the CoNLL-U file for a split (`train`, `dev` or `test`) in a
/// treebank directory, accepting any `*-ud-<split>.conllu` name.
pub fn split_path(treebank_dir: &Path, split: &str) -> Result<PathBuf> {
    let suffix = format!("-ud-{}.conllu", split);

    if treebank_dir.is_dir() {
        for entry in treebank_dir
            .read_dir()
            .with_context(|| format!("Cannot read treebank directory {}", treebank_dir.display()))?
        {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(&suffix) {
                return Ok(entry.path());
            }
        }
    }

    bail!(
        "No *{} found in {}\nDownload the treebank with:\n  git clone \
         https://github.com/UniversalDependencies/UD_English-EWT.git {}",
        suffix,
        treebank_dir.display(),
        treebank_dir.display()
    )
}

/// Read all sentences of a treebank split into memory.
pub fn read_split(treebank_dir: &Path, split: &str) -> Result<Vec<Sentence>> {
    let path = split_path(treebank_dir, split)?;
    let file =
        File::open(&path).with_context(|| format!("Cannot open treebank file {}", path.display()))?;

    SentenceIterator::new(BufReader::new(file)).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{SentenceIterator, Token};

    static FRAGMENT: &str = "# sent_id = test-0001\n\
                             # text = He sat down\n\
                             1\tHe\the\tPRON\tPRP\t_\t2\tnsubj\t_\t_\n\
                             2\tsat\tsit\tVERB\tVBD\t_\t0\troot\t_\t_\n\
                             3-4\tdown\t_\t_\t_\t_\t_\t_\t_\t_\n\
                             3\tdown\tdown\tADP\tRP\t_\t2\tcompound:prt\t_\t_\n\
                             3.1\tghost\t_\t_\t_\t_\t_\t_\t_\t_\n\
                             short line without tabs\n\
                             \n\
                             1\tOk\tok\tINTJ\tUH\t_\t0\troot\t_\t_\n";

    #[test]
    fn reads_sentences_and_skips_non_tokens() {
        let sentences: Vec<_> = SentenceIterator::new(Cursor::new(FRAGMENT))
            .map(|s| s.unwrap())
            .collect();

        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].len(), 3);
        assert_eq!(
            sentences[0][1],
            Token {
                form: "sat".to_owned(),
                xpos: "VBD".to_owned(),
                head: 0,
                deprel: "root".to_owned(),
            }
        );
        assert_eq!(sentences[0][2].form, "down");
        assert_eq!(sentences[1].len(), 1);
        assert_eq!(sentences[1][0].xpos, "UH");
    }

    #[test]
    fn empty_input_yields_no_sentences() {
        let mut iter = SentenceIterator::new(Cursor::new("# only a comment\n\n\n"));
        assert!(iter.next().is_none());
    }
}
