//! Readers for the corpus files produced by the offline pipeline.
//!
//! The embedding matrix is a numeric `.npy` read through candle. Question
//! texts may be a fixed-width string `.npy` (`<U*` or `|S*`), an object array
//! (`|O`, pickled, as `np.save` writes a `dtype=object` array), a JSON array or
//! a newline-delimited text file.

use anyhow::{Context, Result};
use candle_core::{DType, Tensor};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::warn;

use seeker_core::error::Error;

use crate::pickle;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Load an `(N, D)` floating point matrix as `f32`.
pub fn load_embedding_matrix(path: &Path) -> Result<Tensor> {
    if !path.is_file() {
        return Err(Error::resource_load("embeddings", path, "file not found").into());
    }
    let tensor = Tensor::read_npy(path).map_err(|e| Error::resource_load("embeddings", path, e))?;
    if tensor.rank() != 2 {
        return Err(Error::Malformed(format!(
            "{}: expected a 2-D (N, D) matrix, got shape {:?}",
            path.display(),
            tensor.dims()
        ))
        .into());
    }
    match tensor.dtype() {
        DType::F16 | DType::BF16 | DType::F32 | DType::F64 => {}
        other => {
            return Err(Error::Malformed(format!("{}: expected floating point embeddings, got {:?}", path.display(), other)).into());
        }
    }
    let tensor = tensor.to_dtype(DType::F32)?;
    let zero_rows = tensor
        .sqr()?
        .sum(1)?
        .to_vec1::<f32>()?
        .into_iter()
        .filter(|n| *n == 0.0)
        .count();
    if zero_rows > 0 {
        warn!("{}: {} all-zero rows will score 0 against every query", path.display(), zero_rows);
    }
    Ok(tensor)
}

/// Load question texts; the format is chosen by file extension.
pub fn load_question_texts(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::resource_load("question data", path, "file not found").into());
    }
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("npy") => {
            let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            parse_string_npy(&bytes).map_err(|e| Error::resource_load("question data", path, e).into())
        }
        Some("json") => {
            let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<Vec<String>>(&text)
                .map_err(|e| Error::resource_load("question data", path, format!("expected a JSON array of strings: {e}")).into())
        }
        Some("txt") => {
            let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(text.lines().map(str::to_string).collect())
        }
        _ => Err(Error::resource_load("question data", path, "unsupported extension (expected .npy, .json or .txt)").into()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    pub fn len(&self) -> usize {
        self.shape.iter().fold(1, |acc, &d| acc.saturating_mul(d))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split an `.npy` file into its header and the raw data bytes.
pub fn parse_header(bytes: &[u8]) -> Result<(NpyHeader, &[u8]), Error> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(Error::Malformed("not an .npy file (bad magic)".into()));
    }
    let major = bytes[6];
    let (header_len, start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(Error::Malformed("truncated .npy header".into()));
            }
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => return Err(Error::Malformed(format!("unsupported .npy version {v}"))),
    };
    let end = start + header_len;
    if bytes.len() < end {
        return Err(Error::Malformed("truncated .npy header".into()));
    }
    let dict = String::from_utf8_lossy(&bytes[start..end]);
    let header = NpyHeader {
        descr: dict_str(&dict, "descr")?,
        fortran_order: dict_raw(&dict, "fortran_order")?.starts_with("True"),
        shape: dict_shape(&dict)?,
    };
    Ok((header, &bytes[end..]))
}

fn dict_raw<'a>(dict: &'a str, key: &str) -> Result<&'a str, Error> {
    let needle = format!("'{key}':");
    let pos = dict
        .find(&needle)
        .ok_or_else(|| Error::Malformed(format!(".npy header has no '{key}'")))?;
    Ok(dict[pos + needle.len()..].trim_start())
}

fn dict_str(dict: &str, key: &str) -> Result<String, Error> {
    let rest = dict_raw(dict, key)?;
    let quote = rest
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| Error::Malformed(format!(".npy header '{key}' is not a string")))?;
    let body = &rest[1..];
    let close = body
        .find(quote)
        .ok_or_else(|| Error::Malformed(format!(".npy header '{key}' is unterminated")))?;
    Ok(body[..close].to_string())
}

fn dict_shape(dict: &str) -> Result<Vec<usize>, Error> {
    let rest = dict_raw(dict, "shape")?;
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.split_once(')'))
        .map(|(inner, _)| inner)
        .ok_or_else(|| Error::Malformed(".npy header 'shape' is not a tuple".into()))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| Error::Malformed(format!(".npy shape entry '{s}' is not an integer")))
        })
        .collect()
}

/// Decode a 1-D question array: fixed-width strings (`<U*`, `>U*`, `|S*`) or
/// a pickled object array (`|O`).
pub fn parse_string_npy(bytes: &[u8]) -> Result<Vec<String>, Error> {
    let (header, data) = parse_header(bytes)?;
    if header.shape.iter().skip(1).any(|&d| d != 1) {
        return Err(Error::Malformed(format!("expected a 1-D array of questions, got shape {:?}", header.shape)));
    }
    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::Malformed(format!("shape {:?} overflows", header.shape)))?;
    let descr = header.descr.as_str();
    if descr.ends_with('O') {
        return parse_object_items(data, count);
    }
    let (order, kind, width) = split_descr(descr)?;
    let item_size = match kind {
        'U' => width.checked_mul(4),
        'S' => Some(width),
        _ => return Err(Error::Malformed(format!("expected a string dtype, got '{descr}'"))),
    }
    .ok_or_else(|| Error::Malformed(format!("dtype '{descr}' is too wide")))?;
    let needed = count
        .checked_mul(item_size)
        .ok_or_else(|| Error::Malformed(format!("{count} items of '{descr}' overflow the address space")))?;
    if data.len() < needed {
        return Err(Error::Malformed(format!(
            "data holds {} bytes, {} items of '{}' need {}",
            data.len(),
            count,
            descr,
            needed
        )));
    }
    if item_size == 0 {
        return Ok(vec![String::new(); count]);
    }
    data.chunks_exact(item_size)
        .take(count)
        .map(|item| match kind {
            'U' => decode_utf32(item, order == '>'),
            _ => Ok(String::from_utf8_lossy(trim_nul(item)).into_owned()),
        })
        .collect()
}

fn parse_object_items(data: &[u8], count: usize) -> Result<Vec<String>, Error> {
    let items = pickle::object_array_items(pickle::load(data)?)?;
    if items.len() != count {
        return Err(Error::Malformed(format!("header shape says {count} questions, pickle holds {}", items.len())));
    }
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| pickle::item_to_text(i, item))
        .collect()
}

fn split_descr(descr: &str) -> Result<(char, char, usize), Error> {
    let mut chars = descr.chars();
    let order = chars.next().ok_or_else(|| Error::Malformed("empty dtype".into()))?;
    let kind = chars.next().ok_or_else(|| Error::Malformed(format!("bad dtype '{descr}'")))?;
    let width = chars
        .as_str()
        .parse::<usize>()
        .map_err(|_| Error::Malformed(format!("bad dtype width in '{descr}'")))?;
    Ok((order, kind, width))
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn decode_utf32(item: &[u8], big_endian: bool) -> Result<String, Error> {
    let mut out = String::with_capacity(item.len() / 4);
    for cp in item.chunks_exact(4) {
        let raw = [cp[0], cp[1], cp[2], cp[3]];
        let code = if big_endian { u32::from_be_bytes(raw) } else { u32::from_le_bytes(raw) };
        if code == 0 {
            continue;
        }
        let ch = char::from_u32(code).ok_or_else(|| Error::Malformed(format!("invalid code point {code:#x}")))?;
        out.push(ch);
    }
    Ok(out)
}

/// Write questions as a little-endian `<U*` array, the layout
/// `np.save(path, np.array(questions))` produces.
pub fn write_question_npy(path: &Path, questions: &[String]) -> Result<()> {
    let width = questions.iter().map(|q| q.chars().count()).max().unwrap_or(0).max(1);
    let dict = format!("{{'descr': '<U{width}', 'fortran_order': False, 'shape': ({},), }}", questions.len());
    // Header (magic + version + len + dict + padding + '\n') is 64-byte aligned.
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let header = format!("{dict}{}\n", " ".repeat(padding));
    let header_len = u16::try_from(header.len()).context(".npy header too long")?;

    let mut out = Vec::with_capacity(unpadded + padding + questions.len() * width * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for q in questions {
        let mut n = 0;
        for ch in q.chars() {
            out.extend_from_slice(&(ch as u32).to_le_bytes());
            n += 1;
        }
        out.extend(std::iter::repeat(0u8).take((width - n) * 4));
    }
    let mut f = fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    f.write_all(&out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn npy_bytes(dict: &str, data: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        let header = format!("{dict}\n");
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn header_fields_are_parsed() {
        let bytes = npy_bytes("{'descr': '<U5', 'fortran_order': False, 'shape': (3,), }", &[]);
        let (h, data) = parse_header(&bytes).unwrap();
        assert_eq!(h.descr, "<U5");
        assert!(!h.fortran_order);
        assert_eq!(h.shape, vec![3]);
        assert!(data.is_empty());
    }

    #[test]
    fn byte_strings_are_trimmed() {
        let data = b"abc\0\0hello";
        let bytes = npy_bytes("{'descr': '|S5', 'fortran_order': False, 'shape': (2,), }", data);
        assert_eq!(parse_string_npy(&bytes).unwrap(), vec!["abc".to_string(), "hello".to_string()]);
    }

    #[test]
    fn big_endian_unicode() {
        let mut data = Vec::new();
        for ch in ['h', 'i'] { data.extend_from_slice(&(ch as u32).to_be_bytes()); }
        let bytes = npy_bytes("{'descr': '>U2', 'fortran_order': False, 'shape': (1,), }", &data);
        assert_eq!(parse_string_npy(&bytes).unwrap(), vec!["hi".to_string()]);
    }

    #[test]
    fn pickled_object_arrays_are_decoded() {
        // np.save of a dtype=object array, pickle protocol 3 (numpy 1.x)
        let bytes = include_bytes!("../tests/fixtures/questions_object_p3.npy");
        let (h, _) = parse_header(bytes).unwrap();
        assert_eq!(h.descr, "|O");
        assert_eq!(
            parse_string_npy(bytes).unwrap(),
            vec![
                "Why did Darth Vader turn to the dark side?",
                "Ça va, Ænima ✓",
                "Why did Darth Vader turn to the dark side?",
                "Who built the Death Star?",
            ]
        );
    }

    #[test]
    fn heterogeneous_object_array_protocol_4() {
        // numpy 2.x layout: numpy._core, framed protocol 4, a None, an int and a NaN
        let bytes = include_bytes!("../tests/fixtures/questions_object_p4.npy");
        let qs = parse_string_npy(bytes).unwrap();
        assert_eq!(qs.len(), 7);
        assert_eq!(qs[2], qs[0]);
        assert_eq!(qs[3], "Who built the Death Star?");
        assert_eq!(&qs[4..], &["", "42", ""]);
    }

    #[test]
    fn object_array_count_must_match_header() {
        let full = include_bytes!("../tests/fixtures/questions_object_p3.npy");
        let (_, payload) = parse_header(full).unwrap();
        let bytes = npy_bytes("{'descr': '|O', 'fortran_order': False, 'shape': (9,), }", payload);
        assert!(matches!(parse_string_npy(&bytes), Err(Error::Malformed(_))));
        let cut = npy_bytes("{'descr': '|O', 'fortran_order': False, 'shape': (4,), }", &payload[..payload.len() / 2]);
        assert!(matches!(parse_string_npy(&cut), Err(Error::Malformed(_))));
    }

    #[test]
    fn object_array_file_loads_through_question_reader() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("question_data.npy");
        fs::write(&path, include_bytes!("../tests/fixtures/questions_object_p3.npy")).unwrap();
        assert_eq!(load_question_texts(&path).unwrap().len(), 4);
    }

    #[test]
    fn huge_shapes_are_malformed_not_overflow() {
        let bytes = npy_bytes("{'descr': '<U4', 'fortran_order': False, 'shape': (4611686018427387904,), }", &[0; 16]);
        assert!(matches!(parse_string_npy(&bytes), Err(Error::Malformed(_))));
        let wide = npy_bytes("{'descr': '<U4611686018427387904', 'fortran_order': False, 'shape': (1,), }", &[0; 16]);
        assert!(matches!(parse_string_npy(&wide), Err(Error::Malformed(_))));
        let (h, _) = parse_header(&npy_bytes("{'descr': '|S1', 'fortran_order': False, 'shape': (4294967296, 4294967296, 4), }", &[])).unwrap();
        assert_eq!(h.len(), usize::MAX);
    }

    #[test]
    fn truncated_data_is_malformed() {
        let bytes = npy_bytes("{'descr': '<U4', 'fortran_order': False, 'shape': (2,), }", &[0; 8]);
        assert!(matches!(parse_string_npy(&bytes), Err(Error::Malformed(_))));
    }

    #[test]
    fn bad_magic_is_malformed() {
        assert!(matches!(parse_header(b"PK\x03\x04 not numpy"), Err(Error::Malformed(_))));
    }

    #[test]
    fn written_unicode_file_reads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("q.npy");
        let qs = vec!["Who is Tom Bombadil?".to_string(), "Ça va, Ænima — ✓".to_string(), String::new()];
        write_question_npy(&path, &qs).unwrap();
        let bytes = fs::read(&path).unwrap();
        let (h, _) = parse_header(&bytes).unwrap();
        assert_eq!(h.shape, vec![3]);
        // data starts on a 64-byte boundary like numpy's own writer
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(h.descr, "<U20");
        assert_eq!(load_question_texts(&path).unwrap(), qs);
    }

    #[test]
    fn json_and_txt_question_files() {
        let tmp = TempDir::new().unwrap();
        let json = tmp.path().join("q.json");
        fs::write(&json, r#"["a?", "b?"]"#).unwrap();
        assert_eq!(load_question_texts(&json).unwrap(), vec!["a?", "b?"]);

        let txt = tmp.path().join("q.txt");
        fs::write(&txt, "first?\nsecond?\n").unwrap();
        assert_eq!(load_question_texts(&txt).unwrap(), vec!["first?", "second?"]);

        let other = tmp.path().join("q.csv");
        fs::write(&other, "x").unwrap();
        assert!(load_question_texts(&other).is_err());
    }

    #[test]
    fn missing_files_are_resource_errors() {
        let tmp = TempDir::new().unwrap();
        let err = load_embedding_matrix(&tmp.path().join("nope.npy")).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ResourceLoad { resource: "embeddings", .. })));
        let err = load_question_texts(&tmp.path().join("nope.npy")).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ResourceLoad { resource: "question data", .. })));
    }

    #[test]
    fn matrix_must_be_two_dimensional() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v.npy");
        Tensor::new(&[1.0f32, 2.0, 3.0], &candle_core::Device::Cpu).unwrap().write_npy(&path).unwrap();
        let err = load_embedding_matrix(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Malformed(_))));
    }

    #[test]
    fn f64_matrix_is_converted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.npy");
        Tensor::from_vec(vec![1.0f64, 0.0, 0.0, 1.0], (2, 2), &candle_core::Device::Cpu).unwrap().write_npy(&path).unwrap();
        let m = load_embedding_matrix(&path).unwrap();
        assert_eq!(m.dtype(), DType::F32);
        assert_eq!(m.dims(), &[2, 2]);
    }

    #[test]
    fn f16_matrix_is_converted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("h.npy");
        Tensor::from_vec(vec![0.5f32, 0.25, 1.0, 2.0], (2, 2), &candle_core::Device::Cpu)
            .unwrap()
            .to_dtype(DType::F16)
            .unwrap()
            .write_npy(&path)
            .unwrap();
        let m = load_embedding_matrix(&path).unwrap();
        assert_eq!(m.dtype(), DType::F32);
        assert_eq!(m.to_vec2::<f32>().unwrap(), vec![vec![0.5, 0.25], vec![1.0, 2.0]]);
    }

    #[test]
    fn integer_matrix_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("u.npy");
        Tensor::from_vec(vec![1u32, 2, 3, 4], (2, 2), &candle_core::Device::Cpu).unwrap().write_npy(&path).unwrap();
        let err = load_embedding_matrix(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Malformed(_))), "{err}");
    }
}
