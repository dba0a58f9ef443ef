//! Test doubles shared by the pipeline tests.

use crate::config::{ChartCategory, ChartEntry, Config, DownloadConfig, LoggingConfig, TileConfig, ToolsConfig, WorkspaceConfig};
use crate::dates::{parse_chart_date, ChartDate};
use crate::error::ToolError;
use crate::job::ChartJob;
use crate::pipeline::StageContext;
use crate::tools::{CommandRunner, ToolCommand, Toolchain};
use crate::workspace::Workspace;
use std::cell::RefCell;
use tempfile::TempDir;

type Handler = Box<dyn Fn(&ToolCommand) -> Result<String, ToolError>>;

/// Records every command and answers with a caller-supplied handler.
pub(crate) struct RecordingRunner {
    commands: RefCell<Vec<ToolCommand>>,
    handler: Handler,
}

impl RecordingRunner {
    pub fn new(handler: impl Fn(&ToolCommand) -> Result<String, ToolError> + 'static) -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every command succeeds without side effects.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(String::new()))
    }

    pub fn exit_error(command: &ToolCommand) -> ToolError {
        ToolError::Exit {
            command: command.to_string(),
            code: Some(1),
            stderr: "simulated failure".to_string(),
        }
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands.borrow().iter().map(|c| c.program.clone()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &ToolCommand) -> Result<String, ToolError> {
        self.commands.borrow_mut().push(command.clone());
        (self.handler)(command)
    }
}

/// Base configuration rooted in `base_dir`.
pub(crate) fn test_config(base_dir: &std::path::Path, charts: Vec<ChartEntry>) -> Config {
    Config {
        charts,
        process_indexes: None,
        chart_dates: vec!["2024-01-25".to_string()],
        chart_dates_file: None,
        download: DownloadConfig::default(),
        tiles: TileConfig::default(),
        workspace: WorkspaceConfig {
            base_dir: base_dir.to_path_buf(),
            ..WorkspaceConfig::default()
        },
        tools: ToolsConfig::default(),
        logging: LoggingConfig::default(),
    }
}

/// A prepared workspace with one chart job and its stage folders on disk.
pub(crate) struct JobFixture {
    _dir: TempDir,
    pub config: Config,
    pub workspace: Workspace,
    pub job: ChartJob,
}

impl JobFixture {
    fn build(entry: ChartEntry, date: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), vec![entry.clone()]);
        let date = ChartDate::new(parse_chart_date(date).unwrap());

        let workspace = Workspace::new(&config.workspace, &date);
        workspace.prepare().unwrap();
        let job = ChartJob::new(&entry, &config.download, &workspace, &date);
        workspace.prepare_chart(job.stage_dirs()).unwrap();

        Self {
            _dir: dir,
            config,
            workspace,
            job,
        }
    }

    pub fn vfr(work_name: &str, date: &str) -> Self {
        Self::build(
            ChartEntry {
                work_name: work_name.to_string(),
                category: ChartCategory::Vfr,
                alias: None,
            },
            date,
        )
    }

    pub fn ifr(work_name: &str, alias: &str, date: &str) -> Self {
        Self::build(
            ChartEntry {
                work_name: work_name.to_string(),
                category: ChartCategory::Ifr,
                alias: Some(alias.to_string()),
            },
            date,
        )
    }

    pub fn context<'a>(&'a self, runner: &'a dyn CommandRunner) -> StageContext<'a> {
        StageContext {
            job: &self.job,
            tiles: &self.config.tiles,
            zoom: self.config.tiles.zoom().unwrap(),
            tools: Toolchain::new(&self.config.tools),
            runner,
            cache_dir: self.workspace.cache(),
        }
    }
}
