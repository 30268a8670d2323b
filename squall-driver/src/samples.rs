use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use uom::si::{f64::Time, time::second};

use squall_core::{fields, Coupler, ModelError, SampleSink};

/// One line of the corpus header, describing the grid and field schema.
#[derive(Debug, Serialize)]
struct CorpusHeader<'a> {
    nz: usize,
    ny: usize,
    nx: usize,
    xlen: f64,
    ylen: f64,
    zlen: f64,
    fields: Vec<&'a str>,
}

/// One training example: the microphysics input and output states for a
/// single operator-split step.
#[derive(Debug, Serialize)]
struct SampleRecord {
    /// Simulation time at which the step was taken, seconds.
    elapsed: f64,
    /// Step size used, seconds.
    dt: f64,
    /// Pre-microphysics fields, flattened in (z, y, x) order.
    input: BTreeMap<String, Vec<f64>>,
    /// Post-microphysics fields, same layout.
    output: BTreeMap<String, Vec<f64>>,
}

/// Sample sink that appends newline-delimited JSON records.
///
/// The first line of the corpus is a header carrying the grid shape, the
/// domain extent, and the recorded field names; every subsequent line is
/// one [`SampleRecord`]. Records hold the microphysics-relevant fields:
/// temperature, dry density, and every registered tracer.
#[derive(Debug)]
pub struct NdjsonGenerator {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records: u64,
}

impl NdjsonGenerator {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            records: 0,
        }
    }

    /// Where the corpus is (or will be) written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of sample records appended so far, excluding the header.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// The fields a sample records: temperature, dry density, and every
    /// registered tracer.
    fn recorded_fields(coupler: &Coupler) -> Vec<&str> {
        let mut names = vec![fields::TEMP, fields::DENSITY_DRY];
        names.extend(coupler.tracer_names().iter().map(String::as_str));
        names
    }

    fn collect(coupler: &Coupler) -> Result<BTreeMap<String, Vec<f64>>, ModelError> {
        let mut map = BTreeMap::new();
        for name in Self::recorded_fields(coupler) {
            let values = coupler.field(name)?.iter().copied().collect();
            map.insert(name.to_string(), values);
        }
        Ok(map)
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ModelError> {
        self.writer
            .as_mut()
            .ok_or_else(|| ModelError::Io(io::Error::other("sample corpus was not initialized")))
    }
}

impl SampleSink for NdjsonGenerator {
    fn init(&mut self, coupler: &Coupler) -> Result<(), ModelError> {
        let shape = coupler.shape()?;
        let extent = coupler.extent()?;
        let header = CorpusHeader {
            nz: shape.nz,
            ny: shape.ny,
            nx: shape.nx,
            xlen: extent.xlen,
            ylen: extent.ylen,
            zlen: extent.zlen,
            fields: Self::recorded_fields(coupler),
        };

        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &header).map_err(|err| ModelError::Io(err.into()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.writer = Some(writer);
        Ok(())
    }

    fn generate_samples(
        &mut self,
        input: &Coupler,
        output: &Coupler,
        dt: Time,
        elapsed: Time,
    ) -> Result<(), ModelError> {
        let record = SampleRecord {
            elapsed: elapsed.get::<second>(),
            dt: dt.get::<second>(),
            input: Self::collect(input)?,
            output: Self::collect(output)?,
        };

        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, &record).map_err(|err| ModelError::Io(err.into()))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.records += 1;
        Ok(())
    }
}
