// ==============================================================================
// parsers/vcf.rs - VCF file parser
// ==============================================================================
// Description: Text-mode VCF reader producing typed variant records
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-19
// Version: 2.0.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================
// Framing, header parsing and the fixed columns come from noodles-vcf. INFO
// values are typed here from the header's INFO definitions so that a value
// that does not match its declared type falls back to text instead of failing
// the record. Compression is detected from the leading bytes: BGZF blocks go
// through noodles-bgzf, plain gzip through flate2.
// ==============================================================================

use flate2::read::MultiGzDecoder;
use noodles_bgzf as bgzf;
use noodles_vcf as vcf;
use noodles_vcf::header::record::value::map::info::{Number, Type};
use noodles_vcf::variant::record::{AlternateBases, Filters, Ids};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::genotype::AllelePair;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// gzip FLG bit announcing an extra field
const FEXTRA: u8 = 0x04;

/// A raw INFO attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Present-without-value flag attribute
    Flag,
    Integer(i64),
    Float(f64),
    String(String),
    /// "." placeholder
    Missing,
    List(Vec<AttributeValue>),
}

/// One parsed VCF data line
///
/// This is the record interface the ingestion pipeline consumes; nothing
/// downstream depends on how the line was read.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    /// Chromosome exactly as written in the file
    pub chrom: String,
    /// 1-based position
    pub pos: i64,
    pub ids: Vec<String>,
    pub ref_allele: String,
    /// Alternate alleles, empty when ALT is "."
    pub alts: Vec<String>,
    pub qual: Option<f64>,
    /// Failed filters; empty for "PASS" and "."
    pub filters: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// One allele pair per header sample, in header order
    pub genotypes: Vec<AllelePair>,
}

/// VCF parsing errors
#[derive(Error, Debug)]
pub enum VCFParseError {
    #[error("Failed to open VCF file {path}: {source}")]
    FileOpenError {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read VCF header: {0}")]
    HeaderError(String),

    #[error("Invalid record at line {line}: {details}")]
    InvalidRecord { line: usize, details: String },

    #[error("Invalid position at line {line}: {details}")]
    InvalidPosition { line: usize, details: String },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Input compression, detected from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bgzf,
}

impl Compression {
    /// Classify a stream from its first bytes
    ///
    /// BGZF is gzip with an extra field whose first subfield is `BC`.
    pub fn detect(head: &[u8]) -> Self {
        if !head.starts_with(&GZIP_MAGIC) {
            return Compression::None;
        }
        if head.len() >= 14 && head[3] & FEXTRA != 0 && &head[12..14] == b"BC" {
            Compression::Bgzf
        } else {
            Compression::Gzip
        }
    }
}

/// Counts the newlines the wrapped reader hands out
struct LineCounter<R> {
    inner: R,
    lines: usize,
    at_line_start: bool,
}

impl<R: BufRead> LineCounter<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            lines: 0,
            at_line_start: true,
        }
    }

    /// 1-based number of the line most recently read from
    fn line_number(&self) -> usize {
        if self.at_line_start {
            self.lines
        } else {
            self.lines + 1
        }
    }
}

impl<R: BufRead> Read for LineCounter<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = {
            let buf = self.fill_buf()?;
            let n = buf.len().min(out.len());
            out[..n].copy_from_slice(&buf[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for LineCounter<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // The buffer is already filled here, so this performs no I/O
        if let Ok(buf) = self.inner.fill_buf() {
            let consumed = &buf[..amt.min(buf.len())];
            self.lines += consumed.iter().filter(|&&b| b == b'\n').count();
            if let Some(&last) = consumed.last() {
                self.at_line_start = last == b'\n';
            }
        }
        self.inner.consume(amt);
    }
}

fn text<T: AsRef<str>>(field: T) -> String {
    field.as_ref().to_string()
}

/// Streaming VCF reader
pub struct VCFReader {
    inner: vcf::io::Reader<LineCounter<Box<dyn BufRead>>>,
    header: vcf::Header,
    samples: Vec<String>,
    record: vcf::Record,
}

impl VCFReader {
    /// Open a VCF file (.vcf, gzip or BGZF .vcf.gz) and read its header
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VCFParseError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| VCFParseError::FileOpenError {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut buffered = BufReader::new(file);
        let inner: Box<dyn BufRead> = match Compression::detect(buffered.fill_buf()?) {
            Compression::Bgzf => Box::new(bgzf::io::Reader::new(buffered)),
            Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(buffered))),
            Compression::None => Box::new(buffered),
        };

        Self::from_reader(inner)
    }

    /// Read the header from an already opened (decompressed) stream
    pub fn from_reader(reader: impl BufRead + 'static) -> Result<Self, VCFParseError> {
        let boxed: Box<dyn BufRead> = Box::new(reader);
        let mut inner = vcf::io::Reader::new(LineCounter::new(boxed));

        let header = inner
            .read_header()
            .map_err(|e| VCFParseError::HeaderError(e.to_string()))?;
        let samples = header.sample_names().iter().cloned().collect();

        Ok(Self {
            inner,
            header,
            samples,
            record: vcf::Record::default(),
        })
    }

    pub fn header(&self) -> &vcf::Header {
        &self.header
    }

    /// Sample names from the #CHROM line, in column order
    pub fn sample_names(&self) -> &[String] {
        &self.samples
    }

    /// Line number of the most recently read line
    pub fn line_number(&self) -> usize {
        self.inner.get_ref().line_number()
    }

    /// Read the next data record
    ///
    /// # Returns
    /// * `Ok(Some(record))` - Parsed record
    /// * `Ok(None)` - End of file
    /// * `Err(VCFParseError)` - Malformed line or I/O failure
    pub fn read_record(&mut self) -> Result<Option<VariantRecord>, VCFParseError> {
        let read = self.inner.read_record(&mut self.record);
        match read {
            Ok(0) => Ok(None),
            Ok(_) => self.convert_record().map(Some),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(VCFParseError::InvalidRecord {
                line: self.line_number(),
                details: e.to_string(),
            }),
            Err(e) => Err(VCFParseError::IoError(e)),
        }
    }

    /// Read up to `max` records; an empty batch means end of file
    pub fn read_batch(&mut self, max: usize) -> Result<Vec<VariantRecord>, VCFParseError> {
        let mut batch = Vec::with_capacity(max.min(4096));
        while batch.len() < max {
            match self.read_record()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        Ok(batch)
    }

    /// Adapt the current noodles record
    fn convert_record(&self) -> Result<VariantRecord, VCFParseError> {
        let line = self.line_number();
        let record = &self.record;
        let invalid = |field: &str, e: io::Error| VCFParseError::InvalidRecord {
            line,
            details: format!("{}: {}", field, e),
        };

        let pos = match record.variant_start() {
            Some(Ok(position)) => position.get() as i64,
            Some(Err(e)) => {
                return Err(VCFParseError::InvalidPosition {
                    line,
                    details: e.to_string(),
                })
            }
            // POS 0 marks a telomere
            None => 0,
        };

        let ids = record
            .ids()
            .iter()
            .filter(|id| *id != ".")
            .map(String::from)
            .collect();

        let alts = record
            .alternate_bases()
            .iter()
            .filter_map(|alt| match alt {
                Ok(".") => None,
                Ok(alt) => Some(Ok(alt.to_string())),
                Err(e) => Some(Err(e)),
            })
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| invalid("ALT", e))?;

        let qual = record
            .quality_score()
            .transpose()
            .map_err(|e| invalid("QUAL", e))?
            .map(f64::from);

        let filters = record
            .filters()
            .iter(&self.header)
            .filter_map(|filter| match filter {
                Ok("PASS") | Ok(".") => None,
                Ok(filter) => Some(Ok(filter.to_string())),
                Err(e) => Some(Err(e)),
            })
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| invalid("FILTER", e))?;

        let attributes = parse_info(&text(record.info()), &self.header);

        let samples = text(record.samples());
        let columns: Vec<&str> = samples.split('\t').collect();
        let genotypes = parse_genotypes(&columns, self.samples.len());

        Ok(VariantRecord {
            chrom: record.reference_sequence_name().to_string(),
            pos,
            ids,
            ref_allele: text(record.reference_bases()),
            alts,
            qual,
            filters,
            attributes,
            genotypes,
        })
    }
}

impl Iterator for VCFReader {
    type Item = Result<VariantRecord, VCFParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

fn parse_info(info: &str, header: &vcf::Header) -> BTreeMap<String, AttributeValue> {
    let mut attributes = BTreeMap::new();

    let info = info.trim();
    if info == "." || info.is_empty() {
        return attributes;
    }

    for entry in info.split(';').filter(|e| !e.is_empty()) {
        let (key, raw) = match entry.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (entry, None),
        };
        let definition = header.infos().get(key).map(|info| (info.number(), info.ty()));
        attributes.insert(key.to_string(), parse_info_value(raw, definition));
    }

    attributes
}

/// Type one INFO value according to its header definition
///
/// `Number=0|1` yields a scalar, every other cardinality a list. Undeclared
/// keys are scalar unless the value contains a comma.
fn parse_info_value(raw: Option<&str>, definition: Option<(Number, Type)>) -> AttributeValue {
    let raw = match raw {
        None => return AttributeValue::Flag,
        Some(raw) => raw,
    };

    let ty = definition.map(|(_, ty)| ty);
    if ty == Some(Type::Flag) {
        return AttributeValue::Flag;
    }

    let scalar = match definition {
        Some((number, _)) => matches!(number, Number::Count(0) | Number::Count(1)),
        None => !raw.contains(','),
    };

    if scalar {
        return parse_scalar(raw, ty);
    }

    AttributeValue::List(raw.split(',').map(|part| parse_scalar(part, ty)).collect())
}

fn parse_scalar(raw: &str, ty: Option<Type>) -> AttributeValue {
    if raw == "." {
        return AttributeValue::Missing;
    }

    match ty {
        Some(Type::Integer) => raw
            .parse::<i64>()
            .map(AttributeValue::Integer)
            .unwrap_or_else(|_| AttributeValue::String(raw.to_string())),
        Some(Type::Float) => raw
            .parse::<f64>()
            .map(AttributeValue::Float)
            .unwrap_or_else(|_| AttributeValue::String(raw.to_string())),
        Some(_) => AttributeValue::String(raw.to_string()),
        None => {
            if let Ok(i) = raw.parse::<i64>() {
                AttributeValue::Integer(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                AttributeValue::Float(f)
            } else {
                AttributeValue::String(raw.to_string())
            }
        }
    }
}

/// Extract the GT allele pair of every header sample
///
/// `columns` starts at FORMAT. Samples without a column, without a GT key, or
/// with an unparseable GT are reported as missing calls.
fn parse_genotypes(columns: &[&str], sample_count: usize) -> Vec<AllelePair> {
    let gt_index = columns
        .first()
        .and_then(|format| format.split(':').position(|key| key == "GT"));

    (0..sample_count)
        .map(|i| {
            let (Some(gt_index), Some(column)) = (gt_index, columns.get(i + 1)) else {
                return AllelePair::MISSING;
            };
            let gt = column.split(':').nth(gt_index).unwrap_or(".");
            AllelePair::parse_gt(gt).unwrap_or_else(|| {
                tracing::debug!("Unparseable GT '{}', treating as missing", gt);
                AllelePair::MISSING
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const HEADER: &str = "\
##fileformat=VCFv4.2
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth, all samples\">
##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">
##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count\">
##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership\">
##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations: 'Allele | Annotation'\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
";

    fn reader(body: &str) -> VCFReader {
        let text = format!("{}{}", HEADER, body);
        VCFReader::from_reader(Cursor::new(text.into_bytes())).unwrap()
    }

    #[test]
    fn test_header_parsing() {
        let vcf = reader("");
        let header = vcf.header();

        let file_format = header.file_format();
        assert_eq!((file_format.major(), file_format.minor()), (4, 2));
        assert_eq!(vcf.sample_names().to_vec(), vec!["S1", "S2"]);

        let af = header.infos().get("AF").unwrap();
        assert_eq!(af.ty(), Type::Float);
        assert!(!matches!(af.number(), Number::Count(_)));

        let db = header.infos().get("DB").unwrap();
        assert_eq!(db.ty(), Type::Flag);
        assert_eq!(db.number(), Number::Count(0));
    }

    #[test]
    fn test_record_fields() {
        let mut vcf = reader("chr1\t100\trs1;rs2\tA\tT,G\t50.5\tq10;s50\tDP=14;AF=0.5,0.25;DB\tGT:DP\t0/1:7\t1|2:7\n");
        let record = vcf.read_record().unwrap().unwrap();

        assert_eq!(record.chrom, "chr1");
        assert_eq!(record.pos, 100);
        assert_eq!(record.ids, vec!["rs1", "rs2"]);
        assert_eq!(record.ref_allele, "A");
        assert_eq!(record.alts, vec!["T", "G"]);
        assert_eq!(record.qual, Some(50.5));
        assert_eq!(record.filters, vec!["q10", "s50"]);
        assert_eq!(record.attributes["DP"], AttributeValue::Integer(14));
        assert_eq!(
            record.attributes["AF"],
            AttributeValue::List(vec![AttributeValue::Float(0.5), AttributeValue::Float(0.25)])
        );
        assert_eq!(record.attributes["DB"], AttributeValue::Flag);
        assert_eq!(record.genotypes, vec![AllelePair(0, 1), AllelePair(1, 2)]);

        assert!(vcf.read_record().unwrap().is_none());
    }

    #[test]
    fn test_missing_placeholders() {
        let mut vcf = reader("2\t5\t.\tC\t.\t.\tPASS\t.\tGT\t./.\n");
        let record = vcf.read_record().unwrap().unwrap();

        assert!(record.ids.is_empty());
        assert!(record.alts.is_empty());
        assert_eq!(record.qual, None);
        assert!(record.filters.is_empty());
        assert!(record.attributes.is_empty());
        // Second sample has no column at all
        assert_eq!(record.genotypes, vec![AllelePair::MISSING, AllelePair::MISSING]);
    }

    #[test]
    fn test_type_unstable_values_fall_back_to_string() {
        let mut vcf = reader("1\t1\t.\tA\tT\t.\t.\tDP=abc;AC=3;XX=1.5;YY=foo,bar\n");
        let record = vcf.read_record().unwrap().unwrap();

        assert_eq!(record.attributes["DP"], AttributeValue::String("abc".to_string()));
        // Number=A stays a list even with a single value
        assert_eq!(record.attributes["AC"], AttributeValue::List(vec![AttributeValue::Integer(3)]));
        // Undeclared keys are inferred
        assert_eq!(record.attributes["XX"], AttributeValue::Float(1.5));
        assert_eq!(
            record.attributes["YY"],
            AttributeValue::List(vec![
                AttributeValue::String("foo".to_string()),
                AttributeValue::String("bar".to_string()),
            ])
        );
    }

    #[test]
    fn test_ann_is_split_per_entry() {
        let mut vcf = reader("1\t1\t.\tA\tT\t.\t.\tANN=T|missense|MODERATE,T|synonymous|LOW\n");
        let record = vcf.read_record().unwrap().unwrap();

        assert_eq!(
            record.attributes["ANN"],
            AttributeValue::List(vec![
                AttributeValue::String("T|missense|MODERATE".to_string()),
                AttributeValue::String("T|synonymous|LOW".to_string()),
            ])
        );
    }

    #[test]
    fn test_invalid_position() {
        let mut vcf = reader("1\tnotanumber\t.\tA\tT\t.\t.\t.\n");
        match vcf.read_record() {
            Err(VCFParseError::InvalidPosition { line, .. }) => assert_eq!(line, 8),
            other => panic!("Expected InvalidPosition, got {:?}", other),
        }
    }

    #[test]
    fn test_error_reports_line_of_bad_record() {
        let mut vcf = reader("1\t10\t.\tA\tT\t.\t.\t.\n1\tx\t.\tA\tT\t.\t.\t.\n");
        assert_eq!(vcf.read_record().unwrap().unwrap().pos, 10);
        assert!(matches!(
            vcf.read_record(),
            Err(VCFParseError::InvalidPosition { line: 9, .. })
        ));
    }

    #[test]
    fn test_header_without_fileformat() {
        let text = "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
                    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let result = VCFReader::from_reader(Cursor::new(text.as_bytes().to_vec()));
        assert!(matches!(result, Err(VCFParseError::HeaderError(_))));
    }

    #[test]
    fn test_compression_detection() {
        let bgzf_head = [0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff, 0x06, 0x00, b'B', b'C', 0x02, 0x00];
        let gzip_head = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0, 0xff];

        assert_eq!(Compression::detect(&bgzf_head), Compression::Bgzf);
        assert_eq!(Compression::detect(&gzip_head), Compression::Gzip);
        assert_eq!(Compression::detect(b"##fileformat=VCFv4.2"), Compression::None);
    }

    #[test]
    fn test_open_bgzf() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut writer = bgzf::io::Writer::new(File::create(file.path()).unwrap());
            write!(writer, "{}1\t10\t.\tA\tT\t.\t.\t.\n1\t20\t.\tC\tG\t.\t.\t.\n", HEADER).unwrap();
        }

        let positions: Vec<i64> = VCFReader::open(file.path())
            .unwrap()
            .map(|record| record.unwrap().pos)
            .collect();
        assert_eq!(positions, vec![10, 20]);
    }

    #[test]
    fn test_open_gzip_and_batches() {
        use flate2::write::GzEncoder;

        let body = "1\t10\t.\tA\tT\t.\t.\t.\n1\t20\t.\tC\tG\t.\t.\t.\n1\t30\t.\tG\tA\t.\t.\t.\n";
        let mut file = NamedTempFile::new().unwrap();
        {
            let mut encoder = GzEncoder::new(&mut file, flate2::Compression::default());
            encoder.write_all(HEADER.as_bytes()).unwrap();
            encoder.write_all(body.as_bytes()).unwrap();
            encoder.finish().unwrap();
        }

        let mut vcf = VCFReader::open(file.path()).unwrap();
        assert_eq!(vcf.header().sample_names().len(), 2);

        let first = vcf.read_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        let second = vcf.read_batch(2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].pos, 30);
        assert!(vcf.read_batch(2).unwrap().is_empty());
    }

    #[test]
    fn test_open_plain_text() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}1\t10\t.\tA\tT\t.\t.\t.\n", HEADER).unwrap();
        file.flush().unwrap();

        let records: Vec<_> = VCFReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
