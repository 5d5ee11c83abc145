use std::fs::read_to_string;
use std::io;
use std::path::{ Path, PathBuf };

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(raw(setting = "structopt::clap::AppSettings::ColoredHelp"))]
#[structopt(name = "ramuda",
            about = "ビットストリーム・ラムダ計算のインタープリター",
            author = "ammkrn",
            version = "0.1.0")]
pub struct Opt {
    /** パースされたプログラムを実行する前に stderr へダンプして、CLI の
        引数も表示する。
        */
    #[structopt(short = "d", long = "debug")]
    pub debug : bool,

    /** IO アトムの名前表を最小限の $exit/$err/$get/$put に制限する。
        拡張の $eput・$dump はその時、他の未束縛の名前と同じように
        パースエラーになります。
        */
    #[structopt(short = "m", long = "minimal")]
    pub minimal : bool,

    /** 実行したいプログラムのファイルのリスト。引数の順で連結されて
        から一つのプログラムとしてパースされます。
        */
    #[structopt(name = "FILE x N", parse(from_os_str))]
    pub files : Vec<PathBuf>,
}

/// The concatenated program text plus enough bookkeeping to map a byte
/// offset back to the file it came from.
pub struct SourceBundle {
    pub text : String,
    bounds : Vec<(PathBuf, usize)>,
}

impl Opt {
    pub fn try_read_files(&self) -> Result<SourceBundle, (PathBuf, io::Error)> {
        let mut text = String::new();
        let mut bounds = Vec::with_capacity(self.files.len());

        for file in self.files.iter() {
            match try_read_cwd(file) {
                Ok(s) => {
                    text.push_str(&s);
                    bounds.push((file.clone(), text.len()));
                },
                Err(e) => return Err((file.clone(), e)),
            }
        }

        Ok(SourceBundle { text, bounds })
    }
}

fn try_read_cwd(suggestion : &PathBuf) -> Result<String, io::Error> {
    match std::env::current_dir() {
        Err(_) => read_to_string(suggestion),
        Ok(mut path) => {
            path.push(suggestion.clone());
            read_to_string(path)
        }
    }
}

impl SourceBundle {
    /// Which file a byte offset of the concatenation landed in, and the
    /// offset within that file.
    pub fn locate(&self, offset : usize) -> (&Path, usize) {
        let mut start = 0usize;
        for (path, end) in self.bounds.iter() {
            if offset < *end {
                return (path.as_path(), offset - start);
            }
            start = *end;
        }
        // one past the end (eg "expected term" at eof) charges the last file
        match self.bounds.last() {
            Some((path, _)) => {
                let file_start = if self.bounds.len() > 1 {
                    self.bounds[self.bounds.len() - 2].1
                } else {
                    0
                };
                (path.as_path(), offset - file_start)
            },
            None => (Path::new("<no input>"), offset),
        }
    }

    /// Up to sixteen bytes of context starting at the offending offset,
    /// cut at the first newline.
    pub fn snippet(&self, offset : usize) -> &str {
        let bytes = self.text.as_bytes();
        if offset >= bytes.len() {
            return "<end of input>";
        }
        let mut end = (offset + 16).min(bytes.len());
        if let Some(nl) = bytes[offset..end].iter().position(|b| *b == b'\n') {
            end = offset + nl;
        }
        // back off to a utf-8 boundary
        while end > offset && self.text.get(offset..end).is_none() {
            end -= 1;
        }
        self.text.get(offset..end).unwrap_or("")
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn bundle(parts : &[(&str, &str)]) -> SourceBundle {
        let mut text = String::new();
        let mut bounds = Vec::new();
        for (name, body) in parts {
            text.push_str(body);
            bounds.push((PathBuf::from(name), text.len()));
        }
        SourceBundle { text, bounds }
    }

    #[test]
    fn offsets_map_into_the_right_file() {
        let b = bundle(&[("a.lam", ".$get "), ("b.lam", "\\x x")]);
        let (path, local) = b.locate(2);
        assert_eq!(path, Path::new("a.lam"));
        assert_eq!(local, 2);
        let (path, local) = b.locate(7);
        assert_eq!(path, Path::new("b.lam"));
        assert_eq!(local, 1);
    }

    #[test]
    fn snippets_stop_at_newlines() {
        let b = bundle(&[("a.lam", "abc\ndefghij")]);
        assert_eq!(b.snippet(0), "abc");
        assert_eq!(b.snippet(4), "defghij");
        assert_eq!(b.snippet(100), "<end of input>");
    }
}
