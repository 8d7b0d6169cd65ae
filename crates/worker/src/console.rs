//! Line-oriented console transport.
//!
//! Each stdin line is a request: `<user_id> <prompt>`. A prompt starting
//! with `!up ` asks for generation followed by an upscale of every image.
//! Progress and results are printed; images land under the output
//! directory as `<job_id>-<n>.png`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sdbot_core::style::{StyleBook, DEFAULT_STYLE};
use sdbot_core::types::{JobId, UserId};
use sdbot_core::CoreError;
use sdbot_pipeline::job::{Txt2ImgUpscaleParams, DEFAULT_UPSCALE_FACTOR};
use sdbot_pipeline::{AdmissionQueue, Job, JobOutcome, PipelineError, Processor};
use sdbot_webui::models::Txt2ImgParams;
use sdbot_webui::{GenerationOutput, RemoteGenerationClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Prompt prefix requesting the upscale composite job.
pub const UPSCALE_PREFIX: &str = "!up ";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRequest {
    pub user_id: UserId,
    pub prompt: String,
    pub upscale: bool,
}

/// Parse `<user_id> <prompt>`.
pub fn parse_request(line: &str) -> Result<ConsoleRequest, CoreError> {
    let (user, rest) = line
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| CoreError::Validation("Expected `<user_id> <prompt>`".to_string()))?;
    let user_id = user
        .parse::<UserId>()
        .map_err(|_| CoreError::Validation(format!("Invalid user id `{user}`")))?;

    let rest = rest.trim_start();
    let (prompt, upscale) = match rest.strip_prefix(UPSCALE_PREFIX) {
        Some(prompt) => (prompt.trim(), true),
        None if rest == UPSCALE_PREFIX.trim_end() => ("", true),
        None => (rest.trim(), false),
    };
    if prompt.is_empty() {
        return Err(CoreError::Validation("Prompt is empty".to_string()));
    }

    Ok(ConsoleRequest {
        user_id,
        prompt: prompt.to_string(),
        upscale,
    })
}

/// Jobs ahead of one just admitted, given the queue's reported size
/// (which already counts that job).
pub fn queue_position(reported_size: usize) -> usize {
    reported_size.saturating_sub(1)
}

/// Path of the `index`-th image of `job_id`.
pub fn image_path(output_dir: &Path, job_id: JobId, index: usize) -> PathBuf {
    output_dir.join(format!("{job_id}-{index}.png"))
}

pub struct Console {
    queue: AdmissionQueue,
    client: Arc<dyn RemoteGenerationClient>,
    styles: StyleBook,
    upscaler: String,
    output_dir: PathBuf,
}

impl Console {
    pub fn new(
        queue: AdmissionQueue,
        client: Arc<dyn RemoteGenerationClient>,
        styles: StyleBook,
        upscaler: String,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            queue,
            client,
            styles,
            upscaler,
            output_dir,
        }
    }

    /// Read requests from stdin until EOF or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    tracing::info!("Console input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read console input");
                    break;
                }
            }
        }
    }

    /// Parse, stylize, and submit one request line.
    pub async fn handle_line(&self, line: &str) {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(e) => {
                println!("{e}");
                return;
            }
        };

        let job = match self.build_job(&request) {
            Ok(job) => job,
            Err(e) => {
                println!("Error: {e}");
                return;
            }
        };

        let processor = Processor::new(Arc::clone(&self.client), job);
        let job_id = processor.job_id();
        let output_dir = self.output_dir.clone();
        let processor = processor
            .with_status(move |text| async move {
                println!("[{job_id}] {text}");
                Ok::<(), PipelineError>(())
            })
            .with_completion(move |outcome| report(outcome, output_dir));

        if let Err(e) = processor.submit(&self.queue, request.user_id).await {
            if e.is_quota_exceeded() {
                println!("{e}");
            } else {
                println!("Error: {e}");
            }
            return;
        }

        // Read after admission so time spent waiting for space is reflected.
        match queue_position(self.queue.reported_size()) {
            0 => println!("[{job_id}] Generating..."),
            position => println!("[{job_id}] Queued at position {position}"),
        }
    }

    fn build_job(&self, request: &ConsoleRequest) -> Result<Job, CoreError> {
        let styled = self.styles.stylize(DEFAULT_STYLE, &request.prompt)?;
        let params = Txt2ImgParams {
            prompt: styled.positive,
            negative_prompt: styled.negative,
            ..Default::default()
        };

        Ok(if request.upscale {
            Job::Txt2ImgUpscale(Txt2ImgUpscaleParams {
                txt2img: params,
                upscaler: self.upscaler.clone(),
                upscaling_resize: DEFAULT_UPSCALE_FACTOR,
            })
        } else {
            Job::Txt2Img(params)
        })
    }
}

/// Print the outcome and save any images.
async fn report(outcome: JobOutcome, output_dir: PathBuf) {
    let JobOutcome {
        job_id,
        kind,
        result,
        elapsed,
    } = outcome;

    match result {
        Ok(output) => match save_images(&output, &output_dir, job_id).await {
            Ok(paths) => {
                println!(
                    "[{job_id}] {kind} done in {:.1}s, seeds {:?}",
                    elapsed.as_secs_f64(),
                    output.seeds(),
                );
                for path in paths {
                    println!("[{job_id}]   {}", path.display());
                }
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Failed to save images");
                println!("[{job_id}] Error: could not save images: {e}");
            }
        },
        Err(e) => println!("[{job_id}] Error: {e}"),
    }
}

async fn save_images(
    output: &GenerationOutput,
    output_dir: &Path,
    job_id: JobId,
) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut paths = Vec::with_capacity(output.images.len());
    for (index, image) in output.images.iter().enumerate() {
        let path = image_path(output_dir, job_id, index);
        tokio::fs::write(&path, image).await?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn plain_request() {
        let request = parse_request("42 a red fox in snow").unwrap();
        assert_eq!(
            request,
            ConsoleRequest {
                user_id: 42,
                prompt: "a red fox in snow".into(),
                upscale: false,
            }
        );
    }

    #[test]
    fn upscale_request() {
        let request = parse_request("  7   !up castle at dusk ").unwrap();
        assert_eq!(request.user_id, 7);
        assert_eq!(request.prompt, "castle at dusk");
        assert!(request.upscale);
    }

    #[test]
    fn negative_separator_survives_parsing() {
        let request = parse_request("1 cat /// blurry").unwrap();
        assert_eq!(request.prompt, "cat /// blurry");
    }

    #[test]
    fn malformed_requests() {
        assert_matches!(parse_request("hello"), Err(CoreError::Validation(_)));
        assert_matches!(parse_request("abc a prompt"), Err(CoreError::Validation(_)));
        assert_matches!(parse_request("5 !up   "), Err(CoreError::Validation(_)));
    }

    #[test]
    fn position_excludes_the_new_job() {
        assert_eq!(queue_position(1), 0);
        assert_eq!(queue_position(4), 3);
        assert_eq!(queue_position(0), 0);
    }

    #[test]
    fn image_paths_are_indexed() {
        let job_id = JobId::nil();
        let path = image_path(Path::new("out"), job_id, 2);
        assert_eq!(
            path,
            PathBuf::from("out/00000000-0000-0000-0000-000000000000-2.png")
        );
    }
}
