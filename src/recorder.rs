// src/recorder.rs
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use log::{error, info, warn};
use crate::drivers::{PersistenceError, Sample, SampleBuffer, ScopeError};
use crate::types::{AcquisitionState, Action};

const HEADER: [&str; 2] = ["timestamp", "voltage"];

/// On-disk layout for exported captures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFileFormat {
    /// `timestamp,voltage` header then comma rows.
    Csv,
    /// Space separated `t v` rows, no header.
    Text,
}

impl SampleFileFormat {
    /// `.txt` / `.dat` are text; everything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("txt" | "dat") => SampleFileFormat::Text,
            _ => SampleFileFormat::Csv,
        }
    }
}

struct RecordingSession {
    writer: csv::Writer<Box<dyn Write + Send>>,
    cursor: u64,
    written: u64,
}

impl RecordingSession {
    fn write(&mut self, samples: &[Sample]) -> Result<(), PersistenceError> {
        for s in samples {
            self.writer
                .write_record([s.timestamp.to_string(), s.value.to_string()])?;
        }
        self.writer.flush()?;
        self.written += samples.len() as u64;
        Ok(())
    }
}

/// Appends every newly acquired sample to a sink while armed.
#[derive(Default)]
pub struct Recorder {
    session: Option<RecordingSession>,
    target: Option<PathBuf>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    /// File being recorded to, when armed through [`Recorder::arm_file`].
    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    fn check_armable(&self, state: &AcquisitionState) -> Result<(), ScopeError> {
        if matches!(state, AcquisitionState::Error(_)) {
            return Err(ScopeError::InvalidTransition {
                action: Action::Record,
                state: state.clone(),
            });
        }
        if self.is_armed() {
            return Err(PersistenceError::AlreadyArmed.into());
        }
        Ok(())
    }

    /// Start recording into `sink`. Only samples appended after this call are written.
    pub fn arm(
        &mut self,
        sink: impl Write + Send + 'static,
        state: &AcquisitionState,
        buffer: &SampleBuffer,
    ) -> Result<(), ScopeError> {
        self.check_armable(state)?;
        let sink: Box<dyn Write + Send> = Box::new(sink);
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
        writer.write_record(HEADER).map_err(PersistenceError::from)?;
        writer.flush().map_err(PersistenceError::from)?;
        self.session = Some(RecordingSession {
            writer,
            cursor: buffer.next_sequence(),
            written: 0,
        });
        self.target = None;
        Ok(())
    }

    pub fn arm_file(
        &mut self,
        path: impl AsRef<Path>,
        state: &AcquisitionState,
        buffer: &SampleBuffer,
    ) -> Result<(), ScopeError> {
        let path = path.as_ref();
        self.check_armable(state)?;
        let file = File::create(path).map_err(PersistenceError::from)?;
        self.arm(BufWriter::new(file), state, buffer)?;
        self.target = Some(path.to_path_buf());
        info!("recording to {}", path.display());
        Ok(())
    }

    /// Write everything appended since the last call. Returns the number of rows written.
    pub fn record_new(&mut self, buffer: &SampleBuffer) -> Result<usize, ScopeError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        let fresh = buffer.samples_since(session.cursor);
        if fresh.missed > 0 {
            warn!("{} samples were evicted before they could be recorded", fresh.missed);
        }
        match session.write(&fresh.samples) {
            Ok(()) => {
                session.cursor = fresh.next_sequence;
                Ok(fresh.samples.len())
            }
            Err(e) => {
                error!("recording aborted: {e}");
                self.session = None;
                self.target = None;
                Err(e.into())
            }
        }
    }

    /// Flush and close. Returns the rows written by the session; 0 when not armed.
    pub fn disarm(&mut self) -> Result<u64, ScopeError> {
        self.target = None;
        let Some(mut session) = self.session.take() else {
            return Ok(0);
        };
        session.writer.flush().map_err(PersistenceError::from)?;
        info!("recording closed after {} samples", session.written);
        Ok(session.written)
    }
}

/// Write a whole capture in `format`.
pub fn export_samples(
    sink: impl Write,
    samples: &[Sample],
    format: SampleFileFormat,
) -> Result<(), PersistenceError> {
    let (delimiter, header) = match format {
        SampleFileFormat::Csv => (b',', true),
        SampleFileFormat::Text => (b' ', false),
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(sink);
    if header {
        writer.write_record(HEADER)?;
    }
    for s in samples {
        writer.write_record([s.timestamp.to_string(), s.value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_file(path: &Path, samples: &[Sample]) -> Result<(), PersistenceError> {
    let file = File::create(path)?;
    export_samples(BufWriter::new(file), samples, SampleFileFormat::from_path(path))?;
    info!("exported {} samples to {}", samples.len(), path.display());
    Ok(())
}

// `None` for a skippable header line: a non-numeric first row
fn parse_row<'a>(
    mut fields: impl Iterator<Item = &'a str>,
    line: usize,
    first: bool,
    raw: &str,
) -> Result<Option<Sample>, PersistenceError> {
    let malformed = || PersistenceError::Malformed {
        line,
        content: raw.to_string(),
    };
    let (Some(t), Some(v), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(malformed());
    };
    match (t.trim().parse::<f64>(), v.trim().parse::<f64>()) {
        (Ok(t), Ok(v)) => Ok(Some(Sample::new(t, v))),
        // a header names both columns; one numeric field means a damaged data row
        (Err(_), Err(_)) if first => Ok(None),
        _ => Err(malformed()),
    }
}

/// Read a capture written by [`export_samples`] or a recording session.
pub fn import_samples(
    source: impl Read,
    format: SampleFileFormat,
) -> Result<Vec<Sample>, PersistenceError> {
    let mut samples = Vec::new();
    match format {
        SampleFileFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(source);
            let mut record = csv::StringRecord::new();
            let mut first = true;
            while reader.read_record(&mut record)? {
                let line = record.position().map_or(0, |p| p.line() as usize);
                if record.iter().all(|f| f.trim().is_empty()) {
                    continue;
                }
                let raw = record.iter().collect::<Vec<_>>().join(",");
                if let Some(sample) = parse_row(record.iter(), line, first, &raw)? {
                    samples.push(sample);
                }
                first = false;
            }
        }
        SampleFileFormat::Text => {
            let mut first = true;
            for (idx, text) in BufReader::new(source).lines().enumerate() {
                let text = text?;
                if text.trim().is_empty() {
                    continue;
                }
                if let Some(sample) = parse_row(text.split_whitespace(), idx + 1, first, &text)? {
                    samples.push(sample);
                }
                first = false;
            }
        }
    }
    Ok(samples)
}

pub fn import_file(path: &Path) -> Result<Vec<Sample>, PersistenceError> {
    let file = File::open(path)?;
    let samples = import_samples(file, SampleFileFormat::from_path(path))?;
    info!("imported {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> Vec<Sample> {
        (0..50)
            .map(|i| Sample::new(i as f64 * 0.005 + 0.1, (i as f64 * 0.37).sin() * 1.7 - 0.6))
            .collect()
    }

    #[test]
    fn export_import_round_trip() {
        for format in [SampleFileFormat::Csv, SampleFileFormat::Text] {
            let mut bytes = Vec::new();
            export_samples(&mut bytes, &capture(), format).unwrap();
            let back = import_samples(bytes.as_slice(), format).unwrap();
            assert_eq!(back.len(), capture().len());
            for (a, b) in back.iter().zip(capture()) {
                assert!((a.timestamp - b.timestamp).abs() < 1e-9);
                assert!((a.value - b.value).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn import_skips_header_and_blank_lines() {
        let csv = "timestamp,voltage\n0.0,1.5\n\n0.5, -0.25\n";
        assert_eq!(
            import_samples(csv.as_bytes(), SampleFileFormat::Csv).unwrap(),
            vec![Sample::new(0.0, 1.5), Sample::new(0.5, -0.25)]
        );
        let txt = "0.0 1.5\n\n  0.5\t-0.25\n";
        assert_eq!(
            import_samples(txt.as_bytes(), SampleFileFormat::Text).unwrap(),
            vec![Sample::new(0.0, 1.5), Sample::new(0.5, -0.25)]
        );
    }

    #[test]
    fn import_reports_malformed_line() {
        let csv = "timestamp,voltage\n0.0,1.5\n0.1,abc\n";
        match import_samples(csv.as_bytes(), SampleFileFormat::Csv) {
            Err(PersistenceError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
        let txt = "0.0 1.5\n0.1 2.0 3.0\n";
        assert!(matches!(
            import_samples(txt.as_bytes(), SampleFileFormat::Text),
            Err(PersistenceError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn damaged_first_row_is_not_taken_for_a_header() {
        let csv = "0.0,abc\n0.1,1.0\n";
        assert!(matches!(
            import_samples(csv.as_bytes(), SampleFileFormat::Csv),
            Err(PersistenceError::Malformed { line: 1, .. })
        ));
        let txt = "x 1.5\n0.1 1.0\n";
        assert!(matches!(
            import_samples(txt.as_bytes(), SampleFileFormat::Text),
            Err(PersistenceError::Malformed { line: 1, .. })
        ));
        let txt = "t v\n0.1 1.0\n";
        assert_eq!(
            import_samples(txt.as_bytes(), SampleFileFormat::Text).unwrap(),
            vec![Sample::new(0.1, 1.0)]
        );
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SampleFileFormat::from_path(Path::new("a/run.TXT")), SampleFileFormat::Text);
        assert_eq!(SampleFileFormat::from_path(Path::new("run.csv")), SampleFileFormat::Csv);
        assert_eq!(SampleFileFormat::from_path(Path::new("run")), SampleFileFormat::Csv);
    }

    #[test]
    fn records_each_sample_once_across_ticks() {
        let buffer = SampleBuffer::with_capacity(100);
        buffer.append(Sample::new(0.0, 9.0));
        let sink = SharedSink::default();
        let mut recorder = Recorder::new();
        recorder.arm(sink.clone(), &AcquisitionState::Running, &buffer).unwrap();
        assert_eq!(recorder.record_new(&buffer).unwrap(), 0);
        buffer.append(Sample::new(0.1, 1.0));
        buffer.append(Sample::new(0.2, 2.0));
        assert_eq!(recorder.record_new(&buffer).unwrap(), 2);
        assert_eq!(recorder.record_new(&buffer).unwrap(), 0);
        buffer.append(Sample::new(0.3, 3.0));
        assert_eq!(recorder.record_new(&buffer).unwrap(), 1);
        assert_eq!(recorder.disarm().unwrap(), 3);
        assert_eq!(sink.text(), "timestamp,voltage\n0.1,1\n0.2,2\n0.3,3\n");
        assert_eq!(recorder.disarm().unwrap(), 0);
    }

    #[test]
    fn arm_rules() {
        let buffer = SampleBuffer::default();
        let mut recorder = Recorder::new();
        assert!(matches!(
            recorder.arm(Vec::new(), &AcquisitionState::Error("gone".into()), &buffer),
            Err(ScopeError::InvalidTransition { action: Action::Record, .. })
        ));
        recorder.arm(Vec::new(), &AcquisitionState::Idle, &buffer).unwrap();
        assert!(matches!(
            recorder.arm(Vec::new(), &AcquisitionState::Paused, &buffer),
            Err(ScopeError::Persistence(PersistenceError::AlreadyArmed))
        ));
        assert!(recorder.is_armed());
    }

    #[test]
    fn write_failure_aborts_session() {
        let buffer = SampleBuffer::default();
        let mut recorder = Recorder::new();
        assert!(recorder.arm(BrokenSink, &AcquisitionState::Idle, &buffer).is_err());
        assert!(!recorder.is_armed());

        let sink = SharedSink::default();
        recorder.arm(sink, &AcquisitionState::Idle, &buffer).unwrap();
        recorder.session.as_mut().unwrap().writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Box::new(BrokenSink) as Box<dyn Write + Send>);
        buffer.append(Sample::new(0.0, 1.0));
        assert!(matches!(recorder.record_new(&buffer), Err(ScopeError::Persistence(_))));
        assert!(!recorder.is_armed());
    }

    #[test]
    fn recording_file_reimports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        let buffer = SampleBuffer::default();
        let mut recorder = Recorder::new();
        recorder.arm_file(&path, &AcquisitionState::Running, &buffer).unwrap();
        assert_eq!(recorder.target(), Some(path.as_path()));
        for s in capture() {
            buffer.append(s);
        }
        recorder.record_new(&buffer).unwrap();
        recorder.disarm().unwrap();
        assert_eq!(import_file(&path).unwrap(), capture());

        let txt = dir.path().join("capture.txt");
        export_file(&txt, &capture()).unwrap();
        assert!(!std::fs::read_to_string(&txt).unwrap().contains("timestamp"));
        assert_eq!(import_file(&txt).unwrap(), capture());
    }
}
