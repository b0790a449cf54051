//! Grid Result Assembler: collects a job's per-origin results into one
//! finalized binary grid file (C10, spec §4.9).

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::Mutex;

use worker_core::grid_codec::{self, GridHeader, HEADER_SIZE};
use worker_core::{CoreError, GridObjectStore};

use crate::bitset::Bitset;
use crate::origin::Origin;

/// Construction inputs for one job's assembler: a task-like descriptor
/// carrying the job id and grid geometry (§4.9).
pub struct AssemblerDescriptor {
    pub job_id: String,
    pub zoom: i32,
    pub west: i32,
    pub north: i32,
    pub width: u32,
    pub height: u32,
}

struct State {
    n_iterations: Option<u32>,
    buffer_file: Option<tempfile::NamedTempFile>,
    origins_received: Bitset,
    n_complete: u64,
    error: bool,
    finished: bool,
}

/// One instance per job. All public methods are internally synchronized
/// behind a single lock, held across seek+write pairs and across
/// finalize — the file is a shared mutable resource and multiple readers
/// are not supported (§5, §9).
pub struct GridAssembler<S: GridObjectStore> {
    descriptor: AssemblerDescriptor,
    n_total: u64,
    bucket: String,
    store: Arc<S>,
    state: Mutex<State>,
}

impl<S: GridObjectStore> GridAssembler<S> {
    pub fn new(descriptor: AssemblerDescriptor, bucket: impl Into<String>, store: Arc<S>) -> Self {
        let n_total = u64::from(descriptor.width) * u64::from(descriptor.height);
        Self {
            descriptor,
            n_total,
            bucket: bucket.into(),
            store,
            state: Mutex::new(State {
                n_iterations: None,
                buffer_file: None,
                origins_received: Bitset::new(n_total as usize),
                n_complete: 0,
                error: false,
                finished: false,
            }),
        }
    }

    /// Decodes and applies one `Origin` message (§4.9 `handleMessage`).
    /// Duplicate deliveries of an already-received origin are idempotent.
    pub async fn handle_message(&self, bytes: &[u8]) -> Result<(), CoreError> {
        let origin = Origin::decode(bytes)
            .map_err(|e| CoreError::Validation(format!("malformed origin message: {e}")))?;

        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }

        if let Some(n) = state.n_iterations {
            if origin.samples.len() as u32 != n {
                state.error = true;
                tracing::error!(
                    job_id = %self.descriptor.job_id,
                    expected = n,
                    got = origin.samples.len(),
                    "assembler dimension mismatch, job will not finalize"
                );
                return Err(CoreError::AssemblerDimension {
                    expected: n as usize,
                    got: origin.samples.len(),
                });
            }
        } else {
            state.n_iterations = Some(origin.samples.len() as u32);
            self.init_buffer_file(&mut state)?;
        }

        let delta = grid_codec::delta_encode_pixel(&origin.samples);
        let index1d = u64::from(origin.y as u32) * u64::from(self.descriptor.width) + u64::from(origin.x as u32);
        let offset = HEADER_SIZE as u64 + index1d * u64::from(state.n_iterations.unwrap()) * 4;

        {
            let file = state
                .buffer_file
                .as_mut()
                .expect("buffer file initialized above")
                .as_file_mut();
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
            file.write_all(&delta)
                .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        }

        if !state.origins_received.set(index1d as usize) {
            state.n_complete += 1;
        }

        let should_finish = state.n_complete == self.n_total && !state.error;
        if should_finish {
            self.finish(&mut state).await?;
        }
        Ok(())
    }

    fn init_buffer_file(&self, state: &mut State) -> Result<(), CoreError> {
        let n_iterations = state.n_iterations.expect("set by caller");
        let header = GridHeader {
            zoom: self.descriptor.zoom,
            west: self.descriptor.west,
            north: self.descriptor.north,
            width: self.descriptor.width,
            height: self.descriptor.height,
            values_per_pixel: n_iterations,
        };
        let file = tempfile::NamedTempFile::new().map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        {
            let handle = file.as_file();
            handle
                .set_len(header.file_size())
                .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
            let mut header_bytes = Vec::with_capacity(HEADER_SIZE);
            header
                .write_to(&mut header_bytes)
                .expect("writing a header to a Vec cannot fail");
            handle
                .write_at_start(&header_bytes)
                .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        }
        state.buffer_file = Some(file);
        Ok(())
    }

    /// Closes, GZIPs, and uploads the buffer file, then deletes it (§4.9
    /// `finish()`). Safe to call only once per job — callers must hold
    /// `state`'s lock and check `finished` first.
    async fn finish(&self, state: &mut State) -> Result<(), CoreError> {
        // §8 invariant / §9 open question: trust popcount over the running
        // counter at finalize time.
        let popcount = state.origins_received.popcount();
        if popcount != self.n_total {
            state.error = true;
            return Err(CoreError::FatalAssembler(format!(
                "popcount {popcount} disagrees with nComplete at finalize time, expected {}",
                self.n_total
            )));
        }

        let file = state.buffer_file.as_mut().expect("buffer file initialized");
        let handle = file.as_file_mut();
        handle
            .flush()
            .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        let mut raw = Vec::new();
        handle
            .read_to_end(&mut raw)
            .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;

        let gzipped = gzip(&raw).map_err(|e| CoreError::FatalAssembler(e.to_string()))?;

        let key = format!("{}/{}.access", self.bucket, self.descriptor.job_id);
        if let Err(e) = self.store.put(&key, gzipped).await {
            state.error = true;
            return Err(e);
        }

        state.buffer_file = None;
        state.finished = true;
        Ok(())
    }

    /// Closes and deletes the buffer file without uploading. Safe to call
    /// concurrently with `handle_message`.
    pub async fn terminate(&self) {
        let mut state = self.state.lock().await;
        state.buffer_file = None;
        state.finished = true;
    }

    pub async fn n_complete(&self) -> u64 {
        self.state.lock().await.n_complete
    }

    pub async fn has_error(&self) -> bool {
        self.state.lock().await.error
    }

    pub async fn is_finished(&self) -> bool {
        self.state.lock().await.finished
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

trait WriteAtStart {
    fn write_at_start(&self, bytes: &[u8]) -> std::io::Result<()>;
}

impl WriteAtStart for std::fs::File {
    fn write_at_start(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = self.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::sync::Mutex as StdMutex;
    use worker_core::grid_codec::decode_access_grid;

    struct RecordingStore {
        puts: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self { puts: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl GridObjectStore for RecordingStore {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CoreError> {
            self.puts.lock().unwrap().push((key.to_string(), bytes));
            Ok(())
        }
    }

    fn encode_origin(x: i32, y: i32, samples: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_i32::<LittleEndian>(x).unwrap();
        out.write_i32::<LittleEndian>(y).unwrap();
        for &s in samples {
            out.write_i32::<LittleEndian>(s).unwrap();
        }
        out
    }

    fn descriptor_4x4() -> AssemblerDescriptor {
        AssemblerDescriptor {
            job_id: "J1".to_string(),
            zoom: 9,
            west: 0,
            north: 0,
            width: 4,
            height: 4,
        }
    }

    fn gunzip(bytes: &[u8]) -> Vec<u8> {
        use flate2::read::GzDecoder;
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn sparse_fill_finalizes_and_uploads_once_every_origin_arrives() {
        let store = Arc::new(RecordingStore::new());
        let assembler = GridAssembler::new(descriptor_4x4(), "bucket", store.clone());

        for y in 0..4 {
            for x in 0..4 {
                let samples = [i32::from(x + y), i32::from(x * y)];
                let bytes = encode_origin(x, y, &samples);
                assembler.handle_message(&bytes).await.unwrap();
            }
        }

        assert!(assembler.is_finished().await);
        assert!(!assembler.has_error().await);
        assert_eq!(assembler.n_complete().await, 16);

        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "bucket/J1.access");

        let raw = gunzip(&puts[0].1);
        let (header, pixels) = decode_access_grid(&raw).unwrap();
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 4);
        assert_eq!(header.values_per_pixel, 2);
        assert_eq!(pixels.len(), 16);
        // origin (x=2, y=1) -> index1d = 1*4+2 = 6
        assert_eq!(pixels[6], vec![3, 2]);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let store = Arc::new(RecordingStore::new());
        let assembler = GridAssembler::new(descriptor_4x4(), "bucket", store);

        let bytes = encode_origin(0, 0, &[1, 2]);
        assembler.handle_message(&bytes).await.unwrap();
        assembler.handle_message(&bytes).await.unwrap();

        assert_eq!(assembler.n_complete().await, 1);
        assert!(!assembler.is_finished().await);
    }

    #[tokio::test]
    async fn dimension_mismatch_sets_error_and_never_finalizes() {
        let store = Arc::new(RecordingStore::new());
        let assembler = GridAssembler::new(descriptor_4x4(), "bucket", store.clone());

        assembler.handle_message(&encode_origin(0, 0, &[1, 2])).await.unwrap();
        let result = assembler.handle_message(&encode_origin(1, 0, &[1, 2, 3])).await;
        assert!(matches!(result, Err(CoreError::AssemblerDimension { .. })));
        assert!(assembler.has_error().await);

        // Even if the remaining origins are delivered with the right shape,
        // the assembler must never finalize once it has recorded an error.
        for y in 0..4 {
            for x in 0..4 {
                if (x, y) == (0, 0) || (x, y) == (1, 0) {
                    continue;
                }
                let _ = assembler.handle_message(&encode_origin(x, y, &[1, 2])).await;
            }
        }

        assert!(!assembler.is_finished().await);
        assert!(store.puts.lock().unwrap().is_empty());
    }
}
