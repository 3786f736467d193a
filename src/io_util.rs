use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, Result as IoResult, Seek, SeekFrom, Write};
use std::path::Path;
use std::str::FromStr;

/// Returns `true` if the file at `path` exists and can be opened for reading.
pub fn file_exist<P: AsRef<Path>>(path: P) -> bool {
    File::open(path).is_ok()
}

/// Returns the size of the file at `path` in bytes.
///
/// The size is the offset reached by seeking to the end of the file, so it
/// reflects what a reader would see rather than any allocated blocks.
pub fn file_size<P: AsRef<Path>>(path: P) -> IoResult<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}

/// Truncates the file at `path` to zero length, creating it if missing.
pub fn file_wipe<P: AsRef<Path>>(path: P) -> IoResult<()> {
    let path = path.as_ref();
    File::create(path)?;
    log::debug!("Wiped {}", path.display());
    Ok(())
}

/// Prompts on stdout for an integer between `low` and `up` (inclusive) read
/// from stdin.
///
/// Reversed bounds are swapped. Input that is not a number, or a number
/// outside the range, prints `Invalid range (low to up).`, discards the rest of
/// the line and asks again.
///
/// A value is a whole whitespace-delimited token: `12abc` is rejected as a
/// whole instead of being read as `12` with `abc` left behind, which is where
/// this differs from `scanf("%ld")`. Whatever follows an accepted token on the
/// same line stays unread.
pub fn prompt_int(msg: &str, low: i64, up: i64) -> IoResult<i64> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    prompt_int_from(&mut stdin.lock(), &mut stdout.lock(), msg, low, up)
}

/// Prompts on stdout for a number between `low` and `up` (inclusive) read
/// from stdin. See [`prompt_int`] for the re-prompt behaviour.
pub fn prompt_double(msg: &str, low: f64, up: f64) -> IoResult<f64> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    prompt_double_from(&mut stdin.lock(), &mut stdout.lock(), msg, low, up)
}

/// Discards stdin up to and including the next newline, or up to end of
/// stream. Returns the number of bytes discarded.
pub fn clear_stdin() -> IoResult<usize> {
    clear_line(&mut io::stdin().lock())
}

/// [`prompt_int`] over an arbitrary input and output.
pub fn prompt_int_from<R, W>(input: &mut R, output: &mut W, msg: &str, low: i64, up: i64) -> IoResult<i64>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let (low, up) = ordered(low, up);
    prompt_range(input, output, msg, low, up, |v| v.to_string())
}

/// [`prompt_double`] over an arbitrary input and output.
pub fn prompt_double_from<R, W>(input: &mut R, output: &mut W, msg: &str, low: f64, up: f64) -> IoResult<f64>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
{
    let (low, up) = ordered(low, up);
    prompt_range(input, output, msg, low, up, |v| format!("{v:.6}"))
}

/// Discards `input` up to and including the next newline, or up to end of
/// stream. Returns the number of bytes discarded.
pub fn clear_line<R: BufRead + ?Sized>(input: &mut R) -> IoResult<usize> {
    let mut discarded = Vec::new();
    input.read_until(b'\n', &mut discarded)
}

fn ordered<T: PartialOrd>(low: T, up: T) -> (T, T) {
    if up < low { (up, low) } else { (low, up) }
}

fn prompt_range<T, R, W, F>(input: &mut R, output: &mut W, msg: &str, low: T, up: T, show: F) -> IoResult<T>
where
    T: FromStr + PartialOrd + Copy,
    R: BufRead + ?Sized,
    W: Write + ?Sized,
    F: Fn(T) -> String,
{
    write!(output, "{msg}")?;
    output.flush()?;
    loop {
        let token = next_token(input)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "input ended before a value in range was read")
        })?;
        // NaN fails both comparisons, so it is rejected with everything else out of range.
        match token.parse::<T>() {
            Ok(v) if v >= low && v <= up => return Ok(v),
            _ => {
                log::trace!("Rejected prompt input {token:?}");
                invalid_range(output, show(low), show(up))?;
                clear_line(input)?;
            }
        }
    }
}

fn invalid_range<W: Write + ?Sized, D: Display>(output: &mut W, low: D, up: D) -> IoResult<()> {
    writeln!(output, "Invalid range ({low} to {up}).")?;
    output.flush()
}

/// Skips leading whitespace and returns the next whitespace-delimited token,
/// leaving the delimiter unread. `None` at end of stream.
fn next_token<R: BufRead + ?Sized>(input: &mut R) -> IoResult<Option<String>> {
    let mut token = Vec::new();
    loop {
        let (used, done) = {
            let buf = match input.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if buf.is_empty() {
                break;
            }
            let mut used = 0;
            let mut done = false;
            for &b in buf {
                if b.is_ascii_whitespace() {
                    if !token.is_empty() {
                        done = true;
                        break;
                    }
                } else {
                    token.push(b);
                }
                used += 1;
            }
            (used, done)
        };
        input.consume(used);
        if done {
            break;
        }
    }
    if token.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8_lossy(&token).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn run_int(input: &str, low: i64, up: i64) -> (IoResult<i64>, String, Cursor<Vec<u8>>) {
        let mut input = Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        let r = prompt_int_from(&mut input, &mut output, "n? ", low, up);
        (r, String::from_utf8(output).unwrap(), input)
    }

    #[test]
    fn prompt_int_accepts_value_in_range() {
        let (r, out, _) = run_int("7\n", 1, 10);
        assert_eq!(r.unwrap(), 7);
        assert_eq!(out, "n? ");
    }

    #[test]
    fn prompt_int_bounds_are_inclusive() {
        assert_eq!(run_int("1\n", 1, 10).0.unwrap(), 1);
        assert_eq!(run_int("10\n", 1, 10).0.unwrap(), 10);
    }

    #[test]
    fn prompt_int_reprompts_until_in_range() {
        let (r, out, _) = run_int("42\nabc def\n-3\n5\n", 0, 9);
        assert_eq!(r.unwrap(), 5);
        assert_eq!(
            out,
            "n? Invalid range (0 to 9).\nInvalid range (0 to 9).\nInvalid range (0 to 9).\n"
        );
    }

    #[test]
    fn prompt_int_swaps_reversed_bounds() {
        let (r, out, _) = run_int("20\n3\n", 10, -10);
        assert_eq!(r.unwrap(), 3);
        assert_eq!(out, "n? Invalid range (-10 to 10).\n");
    }

    #[test]
    fn prompt_int_rejects_number_with_trailing_garbage() {
        let (r, out, _) = run_int("12abc 3\n4\n", 0, 20);
        assert_eq!(r.unwrap(), 4);
        assert_eq!(out, "n? Invalid range (0 to 20).\n");
    }

    #[test]
    fn prompt_int_leaves_rest_of_line_unread() {
        let (r, _, mut rest) = run_int("  4 trailing\n", 0, 9);
        assert_eq!(r.unwrap(), 4);
        let mut left = String::new();
        rest.read_to_string(&mut left).unwrap();
        assert_eq!(left, " trailing\n");
    }

    #[test]
    fn prompt_int_fails_on_end_of_input() {
        let (r, out, _) = run_int("99\n", 0, 9);
        assert_eq!(r.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, "n? Invalid range (0 to 9).\n");
    }

    #[test]
    fn prompt_double_formats_bounds_like_printf() {
        let mut input = Cursor::new(b"nan\n2.5\n".to_vec());
        let mut output = Vec::new();
        let r = prompt_double_from(&mut input, &mut output, "x? ", 3.0, 0.5);
        assert_eq!(r.unwrap(), 2.5);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "x? Invalid range (0.500000 to 3.000000).\n"
        );
    }

    #[test]
    fn clear_line_stops_after_newline() {
        let mut input = Cursor::new(b"junk here\nnext".to_vec());
        assert_eq!(clear_line(&mut input).unwrap(), 10);
        let mut left = String::new();
        input.read_to_string(&mut left).unwrap();
        assert_eq!(left, "next");
    }

    #[test]
    fn clear_line_stops_at_end_of_stream() {
        let mut input = Cursor::new(b"no newline".to_vec());
        assert_eq!(clear_line(&mut input).unwrap(), 10);
        assert_eq!(clear_line(&mut input).unwrap(), 0);
    }

    #[test]
    fn file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        assert!(!file_exist(&path));
        assert!(file_size(&path).is_err());

        std::fs::write(&path, b"0123456789").unwrap();
        assert!(file_exist(&path));
        assert_eq!(file_size(&path).unwrap(), 10);

        file_wipe(&path).unwrap();
        assert!(file_exist(&path));
        assert_eq!(file_size(&path).unwrap(), 0);
    }

    #[test]
    fn file_wipe_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.txt");
        file_wipe(&path).unwrap();
        assert!(file_exist(&path));
        assert_eq!(file_size(&path).unwrap(), 0);
    }
}
