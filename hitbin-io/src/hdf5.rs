//! HDF5 image containers and bin-statistics storage.
//!
//! A container holds one projection: an extendable `images` dataset of
//! shape `(rows, *image_shape)` and a `metadata` dataset of shape
//! `(rows, n_fields)`. Row `i` of both always describes the same event.
//! Compression and chunking are recorded as root attributes so that later
//! tools can inherit them.

use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, Extent, File, Group};
use hitbin_algorithms::{BinningStats, FieldStats, InfoRecord, SampleMode, StatsSource};
use hitbin_core::{BinEdges, Complib, Compression, Projection, RunConfig};
use log::{debug, warn};
use ndarray::{s, Array2, ArrayD, ArrayView1, ArrayViewD, Ix2, Ix3, Ix4, Ix5, Ix6, IxDyn};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const FORMAT_VERSION: &str = "0.3";
const IMAGES: &str = "images";
const METADATA: &str = "metadata";
const BIN_STATS: &str = "bin_stats";

/// Options for writing image containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageWriteOptions {
    /// Rows per HDF5 chunk.
    pub chunk_rows: usize,
    pub compression: Compression,
    /// Apply the shuffle filter before compression.
    pub shuffle: bool,
    /// Rows buffered in memory before they are written.
    pub flush_rows: usize,
}

impl Default for ImageWriteOptions {
    fn default() -> Self {
        Self {
            chunk_rows: 32,
            compression: Compression::default(),
            shuffle: false,
            flush_rows: 1000,
        }
    }
}

impl ImageWriteOptions {
    /// Writer options of a run.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid compression setting.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Ok(Self {
            chunk_rows: config.chunk_rows,
            compression: config.compression()?,
            shuffle: false,
            flush_rows: config.flush_rows,
        })
    }

    #[must_use]
    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_flush_rows(mut self, rows: usize) -> Self {
        self.flush_rows = rows;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_rows == 0 || self.flush_rows == 0 {
            return Err(hitbin_core::Error::config("chunk size and flush interval must be positive").into());
        }
        Ok(())
    }
}

/// Streaming writer for one projection's images and metadata.
pub struct Hdf5ImageSink {
    file: File,
    path: PathBuf,
    images: Dataset,
    metadata: Option<Dataset>,
    image_shape: Vec<usize>,
    fields: Option<Vec<String>>,
    options: ImageWriteOptions,
    pending_images: Vec<u16>,
    pending_metadata: Vec<f64>,
    pending_rows: usize,
    written_rows: usize,
}

impl Hdf5ImageSink {
    /// Creates a new container, truncating any existing file.
    ///
    /// The `metadata` dataset and its `fields` attribute are created with
    /// the first row, once the field set is known.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        projection: &Projection,
        image_shape: &[usize],
        options: ImageWriteOptions,
    ) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        set_attr_str(&file, "hitbin_format_version", FORMAT_VERSION)?;
        set_attr_str(&file, "projection", &projection.name())?;
        let axes: Vec<String> = projection.axes().iter().map(|a| a.label().to_string()).collect();
        set_attr_str_array(&file, "axes", &axes)?;
        write_compression_attrs(&file, options.compression, options.chunk_rows)?;

        let images = create_row_dataset::<u16>(&file, IMAGES, image_shape, &options)?;
        debug!("created container {} with image shape {image_shape:?}", path.display());

        Ok(Self {
            file,
            path,
            images,
            metadata: None,
            image_shape: image_shape.to_vec(),
            fields: None,
            options,
            pending_images: Vec::new(),
            pending_metadata: Vec::new(),
            pending_rows: 0,
            written_rows: 0,
        })
    }

    /// Opens an existing container for appending.
    ///
    /// Image shape, field names, chunking and compression are taken from
    /// the container; `flush_rows` comes from `options`.
    ///
    /// # Errors
    /// Returns an error if the file is not a valid container.
    pub fn open_append<P: AsRef<Path>>(path: P, flush_rows: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open_rw(&path)?;
        let images = file.dataset(IMAGES)?;
        let shape = images.shape();
        if shape.len() < 2 {
            return Err(Error::InvalidFormat(format!(
                "{}: images dataset must have at least 2 dimensions",
                path.display()
            )));
        }
        let metadata = file.dataset(METADATA).ok();
        let fields = match &metadata {
            Some(_) => Some(read_attr_str_array(&file, "fields")?),
            None => None,
        };
        let (compression, chunk_rows) = read_compression_attrs(&file, &images)?;
        let options = ImageWriteOptions {
            chunk_rows,
            compression,
            shuffle: false,
            flush_rows,
        };
        options.validate()?;

        Ok(Self {
            file,
            path,
            image_shape: shape[1..].to_vec(),
            written_rows: shape[0],
            images,
            metadata,
            fields,
            options,
            pending_images: Vec::new(),
            pending_metadata: Vec::new(),
            pending_rows: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    #[must_use]
    pub fn options(&self) -> &ImageWriteOptions {
        &self.options
    }

    /// Rows accepted so far, written or pending.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.written_rows + self.pending_rows
    }

    /// Rows already on disk.
    #[must_use]
    pub fn written_rows(&self) -> usize {
        self.written_rows
    }

    /// Buffers one image and its metadata row, flushing at the interval.
    ///
    /// # Errors
    /// Returns an error on a shape or field mismatch, or if HDF5 I/O fails.
    pub fn push(&mut self, image: &ArrayD<u16>, record: &InfoRecord) -> Result<()> {
        if image.shape() != self.image_shape.as_slice() {
            return Err(Error::InvalidFormat(format!(
                "image shape {:?} does not match container shape {:?}",
                image.shape(),
                self.image_shape
            )));
        }
        self.check_fields(record.names())?;

        self.pending_images.extend(image.iter().copied());
        self.pending_metadata.extend_from_slice(record.values());
        self.pending_rows += 1;

        if self.pending_rows >= self.options.flush_rows {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffers a block of rows read from another container.
    ///
    /// `images` has the row axis first; `metadata` has one row per image
    /// and one column per entry of `fields`.
    ///
    /// # Errors
    /// Returns an error on a shape or field mismatch, or if HDF5 I/O fails.
    pub fn push_rows(
        &mut self,
        images: &ArrayD<u16>,
        metadata: &Array2<f64>,
        fields: &[String],
    ) -> Result<()> {
        let rows = images.shape().first().copied().unwrap_or(0);
        if images.ndim() < 2 || images.shape()[1..] != self.image_shape[..] {
            return Err(Error::InvalidFormat(format!(
                "image block shape {:?} does not match container shape {:?}",
                images.shape(),
                self.image_shape
            )));
        }
        if metadata.dim() != (rows, fields.len()) {
            return Err(Error::InvalidFormat(format!(
                "metadata block shape {:?} does not match {rows} rows of {} fields",
                metadata.dim(),
                fields.len()
            )));
        }
        if rows == 0 {
            return Ok(());
        }
        self.check_fields(fields)?;

        self.pending_images.extend(images.iter().copied());
        self.pending_metadata.extend(metadata.iter().copied());
        self.pending_rows += rows;

        if self.pending_rows >= self.options.flush_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn check_fields(&mut self, names: &[String]) -> Result<()> {
        match &self.fields {
            Some(fields) if fields.as_slice() != names => {
                Err(hitbin_core::Error::config(format!(
                    "metadata fields {names:?} do not match container fields {fields:?}"
                ))
                .into())
            }
            Some(_) => Ok(()),
            None => {
                self.fields = Some(names.to_vec());
                Ok(())
            }
        }
    }

    /// Writes all pending rows. Images and metadata grow together, so the
    /// container is a valid prefix after every flush.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending_rows == 0 {
            return Ok(());
        }
        let fields = self.fields.clone().unwrap_or_default();
        if self.metadata.is_none() {
            let ds = create_row_dataset::<f64>(&self.file, METADATA, &[fields.len()], &self.options)?;
            set_attr_str_array(&self.file, "fields", &fields)?;
            self.metadata = Some(ds);
        }

        let offset = self.written_rows;
        let rows = self.pending_rows;
        let appended = append_rows(&self.images, offset, rows, &self.image_shape, &self.pending_images)
            .and_then(|()| match &self.metadata {
                Some(ds) => append_rows(ds, offset, rows, &[fields.len()], &self.pending_metadata),
                None => Ok(()),
            });
        if let Err(e) = appended {
            self.truncate_to(offset);
            return Err(e);
        }
        self.file.flush()?;

        self.written_rows += rows;
        self.pending_rows = 0;
        self.pending_images.clear();
        self.pending_metadata.clear();
        debug!("flushed {rows} rows to {}", self.path.display());
        Ok(())
    }

    /// Shrinks both datasets back to `rows` after a failed append.
    fn truncate_to(&self, rows: usize) {
        let mut images = vec![rows];
        images.extend_from_slice(&self.image_shape);
        if let Err(e) = self.images.resize(images) {
            warn!("{}: cannot truncate images to {rows} rows: {e}", self.path.display());
        }
        if let Some(ds) = &self.metadata {
            let mut shape = ds.shape();
            if shape.first().is_some_and(|&n| n > rows) {
                shape[0] = rows;
                if let Err(e) = ds.resize(shape) {
                    warn!("{}: cannot truncate metadata to {rows} rows: {e}", self.path.display());
                }
            }
        }
    }

    /// Stores bin statistics under `bin_stats/`.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails or statistics were already stored.
    pub fn write_bin_stats(&self, stats: &BinningStats) -> Result<()> {
        write_bin_stats_group(&self.file, stats)
    }

    /// Flushes and closes the container, returning the total row count.
    ///
    /// # Errors
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        Ok(self.written_rows)
    }
}

/// Summary of an existing container.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerInfo {
    pub rows: usize,
    pub image_shape: Vec<usize>,
    pub fields: Vec<String>,
    pub projection: Option<String>,
    pub compression: Compression,
    pub chunk_rows: usize,
    pub has_bin_stats: bool,
}

impl ContainerInfo {
    /// Writer options reproducing this container's storage settings.
    #[must_use]
    pub fn write_options(&self, flush_rows: usize) -> ImageWriteOptions {
        ImageWriteOptions {
            chunk_rows: self.chunk_rows,
            compression: self.compression,
            shuffle: false,
            flush_rows,
        }
    }
}

/// Random-access reader for image containers.
pub struct ContainerReader {
    file: File,
    images: Dataset,
    metadata: Option<Dataset>,
    info: ContainerInfo,
}

impl ContainerReader {
    /// Opens a container.
    ///
    /// # Errors
    /// Returns an error if the file is missing or not a valid container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let images = file.dataset(IMAGES)?;
        let shape = images.shape();
        if shape.len() < 2 {
            return Err(Error::InvalidFormat(format!(
                "{}: images dataset must have at least 2 dimensions",
                path.display()
            )));
        }
        let metadata = file.dataset(METADATA).ok();
        let fields = if metadata.is_some() {
            read_attr_str_array(&file, "fields")?
        } else {
            Vec::new()
        };
        if let Some(ds) = &metadata {
            if ds.shape().first() != shape.first() {
                return Err(Error::InvalidFormat(format!(
                    "{}: images and metadata row counts differ",
                    path.display()
                )));
            }
        } else if shape[0] > 0 {
            return Err(Error::InvalidFormat(format!(
                "{}: images present without metadata",
                path.display()
            )));
        }
        let (compression, chunk_rows) = read_compression_attrs(&file, &images)?;
        let info = ContainerInfo {
            rows: shape[0],
            image_shape: shape[1..].to_vec(),
            fields,
            projection: read_attr_opt_string(&file, "projection")?,
            compression,
            chunk_rows,
            has_bin_stats: file.group(BIN_STATS).is_ok(),
        };
        Ok(Self {
            file,
            images,
            metadata,
            info,
        })
    }

    #[must_use]
    pub fn info(&self) -> &ContainerInfo {
        &self.info
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.info.rows
    }

    /// Reads images of rows `range`, shape `(len, *image_shape)`.
    ///
    /// # Errors
    /// Returns an error if the range is out of bounds or HDF5 I/O fails.
    pub fn read_images(&self, range: Range<usize>) -> Result<ArrayD<u16>> {
        self.check_range(&range)?;
        read_rows::<u16>(&self.images, range)
    }

    /// Reads metadata of rows `range`, shape `(len, n_fields)`.
    ///
    /// # Errors
    /// Returns an error if the range is out of bounds or HDF5 I/O fails.
    pub fn read_metadata(&self, range: Range<usize>) -> Result<Array2<f64>> {
        self.check_range(&range)?;
        match &self.metadata {
            Some(ds) => Ok(ds.read_slice::<f64, _, Ix2>(s![range.start..range.end, ..])?),
            None => Ok(Array2::zeros((0, 0))),
        }
    }

    /// Reads the stored bin statistics, if any.
    ///
    /// # Errors
    /// Returns an error if the group exists but is malformed.
    pub fn read_bin_stats(&self) -> Result<Option<BinningStats>> {
        match self.file.group(BIN_STATS) {
            Ok(group) => Ok(Some(read_bin_stats_group(&group)?)),
            Err(_) => Ok(None),
        }
    }

    fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.info.rows {
            return Err(Error::InvalidFormat(format!(
                "row range {range:?} out of bounds for {} rows",
                self.info.rows
            )));
        }
        Ok(())
    }
}

/// Reads the `bin_stats` group of a container.
///
/// # Errors
/// Returns an error if the file cannot be opened or holds no statistics.
pub fn read_bin_stats<P: AsRef<Path>>(path: P) -> Result<BinningStats> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let group = file.group(BIN_STATS).map_err(|_| {
        Error::InvalidFormat(format!("{}: no bin_stats group", path.display()))
    })?;
    read_bin_stats_group(&group)
}

fn write_bin_stats_group(file: &File, stats: &BinningStats) -> Result<()> {
    let root = file.create_group(BIN_STATS)?;
    root.new_attr::<u64>()
        .create("sample_every")?
        .write_scalar(&(stats.sample_every() as u64))?;
    root.new_attr::<u64>().create("seen")?.write_scalar(&stats.seen())?;
    root.new_attr::<u64>()
        .create("sampled")?
        .write_scalar(&stats.sampled())?;
    let names: Vec<String> = stats.fields().iter().map(|f| f.name.clone()).collect();
    set_attr_str_array(&root, "fields", &names)?;

    for field in stats.fields() {
        let group = root.create_group(&field.name)?;
        set_attr_str(&group, "source", field.source.name())?;
        set_attr_str(&group, "mode", field.mode.name())?;
        write_vec(&group, "hist", &field.hist)?;
        write_vec(&group, "hist_bin_edges", field.hist_bin_edges.as_slice())?;
        write_vec(&group, "bin_edges", field.bin_edges.as_slice())?;
        write_vec(&group, "cut_off", &field.cut_off)?;
    }
    Ok(())
}

fn read_bin_stats_group(root: &Group) -> Result<BinningStats> {
    let names = read_attr_str_array(root, "fields")?;
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let group = root.group(&name)?;
        let source = read_attr_opt_string(&group, "source")?.unwrap_or_else(|| name.clone());
        let mode = read_attr_opt_string(&group, "mode")?.unwrap_or_else(|| "raw".to_string());
        let cut_off = read_dataset_vec::<u64>(&group, "cut_off")?;
        let cut_off: [u64; 2] = cut_off.try_into().map_err(|_| {
            Error::InvalidFormat(format!("bin_stats/{name}/cut_off must have 2 entries"))
        })?;
        let hist = read_dataset_vec::<u64>(&group, "hist")?;
        let hist_bin_edges = BinEdges::new(read_dataset_vec::<f64>(&group, "hist_bin_edges")?)?;
        if hist.len() != hist_bin_edges.n_bins() {
            return Err(Error::InvalidFormat(format!(
                "bin_stats/{name}: hist length does not match its edges"
            )));
        }
        fields.push(FieldStats {
            source: StatsSource::from_name(&source)?,
            mode: SampleMode::from_name(&mode)?,
            bin_edges: BinEdges::new(read_dataset_vec::<f64>(&group, "bin_edges")?)?,
            hist_bin_edges,
            hist,
            cut_off,
            name,
        });
    }
    let sample_every = read_attr_opt::<u64>(root, "sample_every")?.unwrap_or(1);
    let seen = read_attr_opt::<u64>(root, "seen")?.unwrap_or(0);
    let sampled = read_attr_opt::<u64>(root, "sampled")?.unwrap_or(0);
    let sample_every = usize::try_from(sample_every)
        .map_err(|_| Error::InvalidFormat("sample_every out of range".to_string()))?;
    Ok(BinningStats::restore(fields, sample_every, seen, sampled)?)
}

fn write_compression_attrs(file: &File, compression: Compression, chunk_rows: usize) -> Result<()> {
    set_attr_str(file, "complib", compression.complib().name())?;
    if let Some(level) = compression.level() {
        file.new_attr::<u8>().create("complevel")?.write_scalar(&level)?;
    }
    file.new_attr::<u64>()
        .create("chunksize")?
        .write_scalar(&(chunk_rows as u64))?;
    Ok(())
}

fn read_compression_attrs(file: &File, images: &Dataset) -> Result<(Compression, usize)> {
    let complib = match read_attr_opt_string(file, "complib")? {
        Some(name) => Complib::from_str(&name)?,
        None => Complib::None,
    };
    let level = read_attr_opt::<u8>(file, "complevel")?;
    let compression = Compression::new(complib, level)?;
    let chunk_rows = match read_attr_opt::<u64>(file, "chunksize")? {
        Some(rows) => usize::try_from(rows)
            .map_err(|_| Error::InvalidFormat("chunksize out of range".to_string()))?,
        None => images
            .chunk()
            .and_then(|chunk| chunk.first().copied())
            .unwrap_or(1),
    };
    Ok((compression, chunk_rows))
}

fn create_row_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    row_shape: &[usize],
    options: &ImageWriteOptions,
) -> Result<Dataset> {
    let mut extents = vec![Extent::resizable(0)];
    extents.extend(row_shape.iter().map(|&d| Extent::fixed(d)));
    let mut chunk = vec![options.chunk_rows];
    chunk.extend(row_shape.iter().map(|&d| d.max(1)));

    let mut builder = group
        .new_dataset::<T>()
        .shape(extents)
        .chunk(chunk)
        .obj_track_times(false);

    if options.shuffle && options.compression != Compression::None {
        builder = builder.shuffle();
    }
    match options.compression {
        Compression::Gzip(level) => builder = builder.deflate(level),
        Compression::Lzf => builder = builder.lzf(),
        Compression::None => {}
    }

    Ok(builder.create(name)?)
}

fn append_rows<T: H5Type>(
    dataset: &Dataset,
    offset: usize,
    rows: usize,
    row_shape: &[usize],
    data: &[T],
) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }
    let end = offset + rows;
    let mut full = vec![end];
    full.extend_from_slice(row_shape);
    dataset.resize(full)?;

    let mut block = vec![rows];
    block.extend_from_slice(row_shape);
    let view = ArrayViewD::from_shape(IxDyn(&block), data)
        .map_err(|e| Error::InvalidFormat(format!("row block shape mismatch: {e}")))?;
    let rank_error = |e: ndarray::ShapeError| Error::InvalidFormat(format!("rank mismatch: {e}"));

    match block.len() {
        2 => dataset.write_slice(&view.into_dimensionality::<Ix2>().map_err(rank_error)?, s![offset..end, ..])?,
        3 => dataset.write_slice(&view.into_dimensionality::<Ix3>().map_err(rank_error)?, s![offset..end, .., ..])?,
        4 => dataset.write_slice(
            &view.into_dimensionality::<Ix4>().map_err(rank_error)?,
            s![offset..end, .., .., ..],
        )?,
        5 => dataset.write_slice(
            &view.into_dimensionality::<Ix5>().map_err(rank_error)?,
            s![offset..end, .., .., .., ..],
        )?,
        6 => dataset.write_slice(
            &view.into_dimensionality::<Ix6>().map_err(rank_error)?,
            s![offset..end, .., .., .., .., ..],
        )?,
        n => {
            return Err(Error::InvalidFormat(format!(
                "unsupported dataset rank {n}"
            )))
        }
    }
    Ok(())
}

fn read_rows<T: H5Type>(dataset: &Dataset, range: Range<usize>) -> Result<ArrayD<T>> {
    let (a, b) = (range.start, range.end);
    let array = match dataset.ndim() {
        2 => dataset.read_slice::<T, _, Ix2>(s![a..b, ..])?.into_dyn(),
        3 => dataset.read_slice::<T, _, Ix3>(s![a..b, .., ..])?.into_dyn(),
        4 => dataset.read_slice::<T, _, Ix4>(s![a..b, .., .., ..])?.into_dyn(),
        5 => dataset.read_slice::<T, _, Ix5>(s![a..b, .., .., .., ..])?.into_dyn(),
        6 => dataset.read_slice::<T, _, Ix6>(s![a..b, .., .., .., .., ..])?.into_dyn(),
        n => {
            return Err(Error::InvalidFormat(format!(
                "unsupported dataset rank {n}"
            )))
        }
    };
    Ok(array)
}

fn write_vec<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    group
        .new_dataset::<T>()
        .shape((values.len(),))
        .obj_track_times(false)
        .create(name)?
        .write(ArrayView1::from(values))?;
    Ok(())
}

fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_array(group: &Group, name: &str, values: &[String]) -> Result<()> {
    let values: Vec<VarLenUnicode> = values
        .iter()
        .map(|value| to_var_len_unicode(value))
        .collect::<Result<Vec<_>>>()?;
    let attr = group
        .new_attr::<VarLenUnicode>()
        .shape((values.len(),))
        .create(name)?;
    attr.write(ArrayView1::from(values.as_slice()))?;
    Ok(())
}

fn read_attr_str_array(group: &Group, name: &str) -> Result<Vec<String>> {
    let attr = group
        .attr(name)
        .map_err(|_| Error::InvalidFormat(format!("missing attribute '{name}'")))?;
    let values: Vec<VarLenUnicode> = attr.read_raw()?;
    Ok(values.iter().map(ToString::to_string).collect())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_attr_opt<T: H5Type + Clone>(group: &Group, name: &str) -> Result<Option<T>> {
    match group.attr(name) {
        Ok(attr) => Ok(Some(attr.read_scalar::<T>()?)),
        Err(_) => Ok(None),
    }
}

fn read_attr_opt_string(group: &Group, name: &str) -> Result<Option<String>> {
    match group.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitbin_core::{Axis, SpatialEdges};
    use ndarray::Array;
    use tempfile::NamedTempFile;

    fn xt() -> Projection {
        Projection::new(&[Axis::X, Axis::Time])
    }

    fn image(seed: u16) -> ArrayD<u16> {
        Array::from_shape_fn(IxDyn(&[3, 2]), |idx| seed + (idx[0] * 2 + idx[1]) as u16)
    }

    fn record(id: f64) -> InfoRecord {
        InfoRecord::new().with("event_id", id).with("energy", id * 1.5)
    }

    #[test]
    fn test_hdf5_image_sink_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let options = ImageWriteOptions::default().with_chunk_rows(2).with_flush_rows(2);

        let mut sink = Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], options).unwrap();
        for i in 0..5u16 {
            sink.push(&image(i * 10), &record(f64::from(i))).unwrap();
        }
        assert_eq!(sink.written_rows(), 4);
        assert_eq!(sink.finish().unwrap(), 5);

        let reader = ContainerReader::open(file.path()).unwrap();
        let info = reader.info();
        assert_eq!(info.rows, 5);
        assert_eq!(info.image_shape, vec![3, 2]);
        assert_eq!(info.fields, vec!["event_id", "energy"]);
        assert_eq!(info.projection.as_deref(), Some("xt"));
        assert_eq!(info.compression, Compression::Gzip(1));
        assert_eq!(info.chunk_rows, 2);

        let images = reader.read_images(3..5).unwrap();
        assert_eq!(images.shape(), &[2, 3, 2]);
        assert_eq!(images[[0, 0, 0]], 30);
        assert_eq!(images[[1, 2, 1]], 45);
        let meta = reader.read_metadata(0..5).unwrap();
        assert_eq!(meta[[4, 0]], 4.0);
        assert_eq!(meta[[4, 1]], 6.0);
    }

    #[test]
    fn test_hdf5_empty_container() {
        let file = NamedTempFile::new().unwrap();
        let sink =
            Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], ImageWriteOptions::default()).unwrap();
        assert_eq!(sink.finish().unwrap(), 0);

        let reader = ContainerReader::open(file.path()).unwrap();
        assert_eq!(reader.rows(), 0);
        assert!(reader.info().fields.is_empty());
        assert!(reader.read_images(0..1).is_err());
    }

    #[test]
    fn test_hdf5_shape_and_field_mismatch() {
        let file = NamedTempFile::new().unwrap();
        let mut sink =
            Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], ImageWriteOptions::default()).unwrap();
        let wrong = ArrayD::<u16>::zeros(IxDyn(&[2, 3]));
        assert!(sink.push(&wrong, &record(0.0)).is_err());

        sink.push(&image(0), &record(0.0)).unwrap();
        let other = InfoRecord::new().with("event_id", 1.0);
        assert!(sink.push(&image(0), &other).unwrap_err().is_config());
    }

    #[test]
    fn test_hdf5_open_append_inherits_settings() {
        let file = NamedTempFile::new().unwrap();
        let options = ImageWriteOptions::default()
            .with_chunk_rows(4)
            .with_compression(Compression::Lzf);
        let mut sink = Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], options).unwrap();
        sink.push(&image(1), &record(1.0)).unwrap();
        sink.finish().unwrap();

        let mut sink = Hdf5ImageSink::open_append(file.path(), 10).unwrap();
        assert_eq!(sink.options().compression, Compression::Lzf);
        assert_eq!(sink.options().chunk_rows, 4);
        assert_eq!(sink.image_shape(), &[3, 2]);
        sink.push(&image(2), &record(2.0)).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        let reader = ContainerReader::open(file.path()).unwrap();
        let meta = reader.read_metadata(0..2).unwrap();
        assert_eq!(meta.column(0).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_hdf5_rows_stay_paired_across_flushes() {
        let file = NamedTempFile::new().unwrap();
        let options = ImageWriteOptions::default().with_chunk_rows(2).with_flush_rows(3);
        let mut sink = Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], options).unwrap();
        for id in [7u16, 3, 11, 5, 2, 9, 4] {
            sink.push(&image(id * 10), &record(f64::from(id))).unwrap();
        }
        assert_eq!(sink.written_rows(), 6);
        assert_eq!(sink.finish().unwrap(), 7);

        let reader = ContainerReader::open(file.path()).unwrap();
        let images = reader.read_images(0..7).unwrap();
        let meta = reader.read_metadata(0..7).unwrap();
        for row in 0..7 {
            let id = meta[[row, 0]] as u16;
            assert_eq!(meta[[row, 1]], meta[[row, 0]] * 1.5);
            assert_eq!(
                images.index_axis(ndarray::Axis(0), row),
                image(id * 10).view(),
                "row {row}"
            );
        }
    }

    #[test]
    fn test_hdf5_failed_metadata_append_rolls_back_images() {
        let file = NamedTempFile::new().unwrap();
        let sink =
            Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], ImageWriteOptions::default()).unwrap();
        sink.finish().unwrap();

        // A fixed-size metadata dataset cannot grow, so the second append fails.
        {
            let h5 = File::open_rw(file.path()).unwrap();
            h5.new_dataset::<f64>().shape((0, 1)).create(METADATA).unwrap();
            set_attr_str_array(&h5, "fields", &["event_id".to_string()]).unwrap();
        }

        let mut sink = Hdf5ImageSink::open_append(file.path(), 1).unwrap();
        let only_id = InfoRecord::new().with("event_id", 1.0);
        assert!(sink.push(&image(1), &only_id).is_err());
        assert_eq!(sink.written_rows(), 0);
        drop(sink);

        let h5 = File::open(file.path()).unwrap();
        assert_eq!(h5.dataset(IMAGES).unwrap().shape(), vec![0, 3, 2]);
        assert_eq!(h5.dataset(METADATA).unwrap().shape(), vec![0, 1]);
    }

    #[test]
    fn test_hdf5_bin_stats_roundtrip() {
        let spatial = SpatialEdges {
            x: BinEdges::linspace(0.0, 10.0, 2).unwrap(),
            y: BinEdges::linspace(0.0, 10.0, 2).unwrap(),
            z: BinEdges::linspace(0.0, 10.0, 2).unwrap(),
            r: BinEdges::linspace(0.0, 7.5, 2).unwrap(),
            center: [5.0, 5.0],
        };
        let time = BinEdges::linspace(-5.0, 5.0, 4).unwrap();
        let mut stats = BinningStats::new(&spatial, &time, 2).unwrap();
        let hits = [hitbin_core::Hit::new(1.0, 2.0, 11.0, 0.0).triggered()]
            .into_iter()
            .collect();
        stats.observe(&hitbin_core::Event::new(hitbin_core::EventInfo::default(), hits));

        let file = NamedTempFile::new().unwrap();
        let sink =
            Hdf5ImageSink::create(file.path(), &xt(), &[3, 2], ImageWriteOptions::default()).unwrap();
        sink.write_bin_stats(&stats).unwrap();
        sink.finish().unwrap();

        let back = read_bin_stats(file.path()).unwrap();
        assert_eq!(back, stats);
        assert_eq!(back.field("pos_z").unwrap().cut_off, [0, 1]);
        assert!(ContainerReader::open(file.path()).unwrap().info().has_bin_stats);
    }
}
