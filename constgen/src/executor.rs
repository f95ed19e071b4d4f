//! Builds and runs the resolver program for the target platform.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

use crate::config::{Config, TargetArch, TargetOs, TargetPlatform};
use crate::error::{ConstGenError, Result, ResolverStage};
use crate::resolver::{ResolverProgram, RESOLVER_SOURCE};

/// C compiler (and optional runner) able to produce binaries for a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub compiler: String,
    pub compiler_args: Vec<String>,
    /// Wrapper used to execute binaries the host cannot run itself
    pub runner: Option<(String, Vec<String>)>,
}

impl Toolchain {
    /// Pick the compiler and runner for `platform`.
    ///
    /// An explicit `compiler`/`runner` in `config` wins; otherwise the host
    /// `cc` is used for host builds and the conventional cross compiler for
    /// the triple everywhere else. Both are looked up on the inherited `PATH`.
    pub fn discover(platform: &TargetPlatform, config: &Config) -> Result<Self> {
        let compiler_line = config
            .compiler
            .clone()
            .unwrap_or_else(|| default_compiler(platform));
        let (compiler, compiler_args) = split_command(&compiler_line);
        if !is_executable_available(&compiler) {
            return Err(ConstGenError::ToolchainNotFound {
                compiler,
                triple: platform.triple(),
            });
        }

        let runner = match config.runner.clone().or_else(|| default_runner(platform)) {
            Some(line) => {
                let (program, args) = split_command(&line);
                if !is_executable_available(&program) {
                    return Err(ConstGenError::ToolchainNotFound {
                        compiler: program,
                        triple: platform.triple(),
                    });
                }
                Some((program, args))
            }
            None => None,
        };

        tracing::debug!(
            "toolchain for {}: compiler '{}', runner {:?}",
            platform.triple(),
            compiler_line,
            runner
        );
        Ok(Self {
            compiler,
            compiler_args,
            runner,
        })
    }
}

fn default_compiler(platform: &TargetPlatform) -> String {
    if platform.is_host() {
        return "cc".to_string();
    }
    let arch = platform.arch.triple_arch();
    match platform.os {
        TargetOs::Windows => format!("{}-w64-mingw32-gcc", arch),
        TargetOs::Linux => format!("{}-linux-gnu-gcc", arch),
        TargetOs::Macos => format!("clang --target={}", platform.triple()),
    }
}

fn default_runner(platform: &TargetPlatform) -> Option<String> {
    let host_os = TargetOs::host();
    let host_arch = TargetArch::host();
    let same_os = host_os == Some(platform.os);
    // 32-bit x86 binaries run natively on x86_64 hosts
    let runs_natively = platform.arch == TargetArch::X86 && host_arch == Some(TargetArch::X86_64);

    if same_os && (host_arch == Some(platform.arch) || runs_natively) {
        return None;
    }
    match platform.os {
        TargetOs::Windows => Some("wine".to_string()),
        TargetOs::Linux => Some(match platform.arch {
            TargetArch::X86_64 => "qemu-x86_64".to_string(),
            TargetArch::X86 => "qemu-i386".to_string(),
            TargetArch::Aarch64 => "qemu-aarch64".to_string(),
        }),
        TargetOs::Macos => None,
    }
}

fn split_command(line: &str) -> (String, Vec<String>) {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

fn find_in_path(executable: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(executable))
        .find(|candidate| candidate.is_file() || candidate.with_extension("exe").is_file())
}

fn is_executable_available(program: &str) -> bool {
    if program.is_empty() {
        return false;
    }
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    find_in_path(program).is_some()
}

/// Compiles the resolver into a private scratch directory and runs it.
///
/// The scratch directory is removed when the executor is dropped, whether or
/// not the run succeeded.
pub struct CrossCompileExecutor {
    platform: TargetPlatform,
    toolchain: Toolchain,
    include_dirs: Vec<PathBuf>,
    scratch: TempDir,
}

impl CrossCompileExecutor {
    pub fn new(
        platform: TargetPlatform,
        toolchain: Toolchain,
        include_dirs: Vec<PathBuf>,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("constgen")
            .tempdir()
            .map_err(|e| ConstGenError::io(std::env::temp_dir(), e))?;
        Ok(Self {
            platform,
            toolchain,
            include_dirs,
            scratch,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Compile `program` for the target and run it with stdout going to `sink`.
    ///
    /// Both child processes inherit this process's environment and stderr.
    pub fn execute(&self, program: &ResolverProgram, sink: File) -> Result<()> {
        let source_path = self.scratch.path().join(RESOLVER_SOURCE);
        fs::write(&source_path, program.source())
            .map_err(|e| ConstGenError::io(&source_path, e))?;
        let binary_path = self
            .scratch
            .path()
            .join(self.platform.executable_name("resolve"));

        let mut compile = Command::new(&self.toolchain.compiler);
        compile.args(&self.toolchain.compiler_args);
        for dir in &self.include_dirs {
            compile.arg(format!("-I{}", dir.display()));
        }
        compile
            .arg("-o")
            .arg(&binary_path)
            .arg(&source_path)
            .current_dir(self.scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit());

        tracing::debug!("compiling resolver: {:?}", compile);
        let status = compile
            .status()
            .map_err(|e| ConstGenError::io(&self.toolchain.compiler, e))?;
        if !status.success() {
            tracing::error!("resolver compilation for {} failed: {}", self.platform, status);
            return Err(ConstGenError::ResolverFailed {
                stage: ResolverStage::Compile,
                status,
            });
        }

        let mut run = match &self.toolchain.runner {
            Some((runner, args)) => {
                let mut cmd = Command::new(runner);
                cmd.args(args).arg(&binary_path);
                cmd
            }
            None => Command::new(&binary_path),
        };
        run.current_dir(self.scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(sink))
            .stderr(Stdio::inherit());

        tracing::debug!("running resolver: {:?}", run);
        let status = run.status().map_err(|e| ConstGenError::io(&binary_path, e))?;
        if !status.success() {
            tracing::error!("resolver program for {} failed: {}", self.platform, status);
            return Err(ConstGenError::ResolverFailed {
                stage: ResolverStage::Run,
                status,
            });
        }

        tracing::info!(
            "resolved {} constant(s) for {}",
            program.statements(),
            self.platform.triple()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_platform() -> Option<TargetPlatform> {
        Some(TargetPlatform::new(TargetOs::host()?, TargetArch::host()?))
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("clang  --target=x86_64-apple-darwin"),
            (
                "clang".to_string(),
                vec!["--target=x86_64-apple-darwin".to_string()]
            )
        );
        assert_eq!(split_command("cc"), ("cc".to_string(), vec![]));
    }

    #[test]
    fn test_default_cross_compilers() {
        let win64 = TargetPlatform::new(TargetOs::Windows, TargetArch::X86_64);
        let win32 = TargetPlatform::new(TargetOs::Windows, TargetArch::X86);
        if !win64.is_host() {
            assert_eq!(default_compiler(&win64), "x86_64-w64-mingw32-gcc");
        }
        if !win32.is_host() {
            assert_eq!(default_compiler(&win32), "i686-w64-mingw32-gcc");
        }
        let mac = TargetPlatform::new(TargetOs::Macos, TargetArch::Aarch64);
        if !mac.is_host() {
            assert_eq!(default_compiler(&mac), "clang --target=aarch64-apple-darwin");
        }
    }

    #[test]
    fn test_windows_runs_under_wine_elsewhere() {
        if TargetOs::host() == Some(TargetOs::Windows) {
            return;
        }
        let win64 = TargetPlatform::new(TargetOs::Windows, TargetArch::X86_64);
        assert_eq!(default_runner(&win64).as_deref(), Some("wine"));
    }

    #[test]
    fn test_host_needs_no_runner() {
        let Some(host) = host_platform() else { return };
        assert_eq!(default_runner(&host), None);
        assert_eq!(default_compiler(&host), "cc");
    }

    #[test]
    fn test_missing_compiler_is_reported() {
        let platform = TargetPlatform::new(TargetOs::Windows, TargetArch::X86_64);
        let config = Config {
            compiler: Some("definitely-not-a-compiler-7f3a".to_string()),
            runner: Some("sh".to_string()),
            ..Config::default()
        };
        match Toolchain::discover(&platform, &config) {
            Err(ConstGenError::ToolchainNotFound { compiler, triple }) => {
                assert_eq!(compiler, "definitely-not-a-compiler-7f3a");
                assert_eq!(triple, "x86_64-pc-windows-gnu");
            }
            other => panic!("expected ToolchainNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let toolchain = Toolchain {
            compiler: "cc".to_string(),
            compiler_args: vec![],
            runner: None,
        };
        let platform = TargetPlatform::new(TargetOs::Linux, TargetArch::X86_64);
        let executor = CrossCompileExecutor::new(platform, toolchain, vec![]).unwrap();
        let scratch = executor.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());
        drop(executor);
        assert!(!scratch.exists());
    }

    #[cfg(unix)]
    mod fake_toolchain {
        use super::*;
        use crate::classifier::ResolutionSet;
        use std::io::{Read, Seek, SeekFrom};

        /// A "compiler" script that emits a shell script running `probe_body`
        fn fake_compiler(dir: &Path, probe_body: &str, exit_code: i32) -> PathBuf {
            let path = dir.join("fakecc");
            let script = format!(
                "#!/bin/sh\n\
                 while [ $# -gt 0 ]; do\n\
                 \tif [ \"$1\" = \"-o\" ]; then out=\"$2\"; shift; fi\n\
                 \tshift\n\
                 done\n\
                 printf '#!/bin/sh\\n{}\\n' > \"$out\"\n\
                 chmod +x \"$out\"\n\
                 exit {}\n",
                probe_body, exit_code
            );
            fs::write(&path, script).unwrap();
            path
        }

        fn executor(script: PathBuf) -> Option<CrossCompileExecutor> {
            let platform = host_platform()?;
            let toolchain = Toolchain {
                compiler: "sh".to_string(),
                compiler_args: vec![script.display().to_string()],
                runner: None,
            };
            Some(CrossCompileExecutor::new(platform, toolchain, vec![]).unwrap())
        }

        fn program() -> ResolverProgram {
            ResolverProgram::build(&ResolutionSet::default(), &[])
        }

        #[test]
        fn test_probe_stdout_goes_to_sink() {
            let tools = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(tools.path(), "echo \"pub const _A: u32 = 7;\"", 0);
            let Some(executor) = executor(compiler) else { return };

            let mut sink = tempfile::tempfile().unwrap();
            executor
                .execute(&program(), sink.try_clone().unwrap())
                .unwrap();
            assert!(executor.scratch_dir().join(RESOLVER_SOURCE).is_file());

            let mut written = String::new();
            sink.seek(SeekFrom::Start(0)).unwrap();
            sink.read_to_string(&mut written).unwrap();
            assert_eq!(written, "pub const _A: u32 = 7;\n");
        }

        #[test]
        fn test_compile_failure() {
            let tools = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(tools.path(), "true", 3);
            let Some(executor) = executor(compiler) else { return };

            match executor.execute(&program(), tempfile::tempfile().unwrap()) {
                Err(ConstGenError::ResolverFailed { stage, status }) => {
                    assert_eq!(stage, ResolverStage::Compile);
                    assert_eq!(status.code(), Some(3));
                }
                other => panic!("expected compile failure, got {:?}", other),
            }
        }

        #[test]
        fn test_probe_failure_keeps_status() {
            let tools = tempfile::tempdir().unwrap();
            let compiler = fake_compiler(tools.path(), "exit 4", 0);
            let Some(executor) = executor(compiler) else { return };

            match executor.execute(&program(), tempfile::tempfile().unwrap()) {
                Err(err @ ConstGenError::ResolverFailed { .. }) => {
                    assert_eq!(err.exit_code(), 1);
                    if let ConstGenError::ResolverFailed { stage, status } = err {
                        assert_eq!(stage, ResolverStage::Run);
                        assert_eq!(status.code(), Some(4));
                    }
                }
                other => panic!("expected run failure, got {:?}", other),
            }
        }
    }
}
