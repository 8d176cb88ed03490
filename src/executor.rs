use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Output of one external tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// stdout and stderr as written to one shared pipe, undecoded
    pub output: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Tool output as text (the Moldflow tools write Windows-1252)
    pub fn text(&self) -> String {
        decode_log(&self.output)
    }
}

/// Process boundary to the Moldflow command line tools
pub trait StudyRunner {
    /// Run the solver on `study_file` with `workdir` as working directory.
    fn run_study(&self, workdir: &Path, study_file: &str) -> Result<ToolOutput, ExecutorError>;

    /// Export result `result_code` of `study_file` as XML. The tool writes
    /// `<study>.xml` into `workdir`.
    fn extract_result(
        &self,
        workdir: &Path,
        study_file: &str,
        result_code: u32,
    ) -> Result<ToolOutput, ExecutorError>;
}

/// `runstudy.exe` and `studyrlt.exe` from a Moldflow installation
pub struct MoldflowToolchain {
    bin_dir: PathBuf,
}

impl MoldflowToolchain {
    pub const SOLVER: &'static str = "runstudy.exe";
    pub const EXTRACTOR: &'static str = "studyrlt.exe";

    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }

    pub fn solver_path(&self) -> PathBuf {
        self.bin_dir.join(Self::SOLVER)
    }

    pub fn extractor_path(&self) -> PathBuf {
        self.bin_dir.join(Self::EXTRACTOR)
    }

    /// Check both executables exist before a long run starts.
    pub fn verify(&self) -> Result<(), ExecutorError> {
        for path in [self.solver_path(), self.extractor_path()] {
            if !path.is_file() {
                return Err(ExecutorError::NotFound(path));
            }
        }
        Ok(())
    }

    fn run(&self, program: &Path, args: &[&str], workdir: &Path) -> Result<ToolOutput, ExecutorError> {
        tracing::info!("Running command: {:?} {}", program, args.join(" "));

        let (mut reader, writer) = std::io::pipe()?;
        let mut child = {
            // The command holds write ends until dropped; reading only ends
            // once every write end is closed.
            let mut command = Command::new(program);
            command
                .args(args)
                .current_dir(workdir)
                .stdout(writer.try_clone()?)
                .stderr(writer);
            command.spawn().map_err(|source| ExecutorError::Launch {
                program: program.to_path_buf(),
                source,
            })?
        };

        let mut combined = Vec::new();
        reader.read_to_end(&mut combined)?;
        let status = child.wait()?;

        let result = ToolOutput {
            exit_code: status.code(),
            output: combined,
        };
        if !result.success() {
            tracing::warn!("{:?} exited with status {}", program, status);
        }
        Ok(result)
    }
}

impl StudyRunner for MoldflowToolchain {
    fn run_study(&self, workdir: &Path, study_file: &str) -> Result<ToolOutput, ExecutorError> {
        self.run(&self.solver_path(), &[study_file], workdir)
    }

    fn extract_result(
        &self,
        workdir: &Path,
        study_file: &str,
        result_code: u32,
    ) -> Result<ToolOutput, ExecutorError> {
        let code = result_code.to_string();
        self.run(&self.extractor_path(), &[study_file, "-xml", &code], workdir)
    }
}

/// Decode Windows-1252 tool output and trim surrounding whitespace.
pub fn decode_log(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        tracing::debug!("Replaced undecodable bytes in tool output");
    }
    text.trim().to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Moldflow executable not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to launch {program:?}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
