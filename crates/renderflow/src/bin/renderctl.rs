use std::env;
use std::time::Duration;

use rand::Rng;
use renderflow::jobs::{
    AdmissionConfig, AdmissionController, JobRegistry, QueueStatus, Reclaimer, ReclaimerConfig,
    Scheduler, SchedulerConfig,
};
use renderflow::config::Config;
use renderflow::render::{FallbackParser, WeatherParser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "renderctl <command>\n\
             Commands:\n\
             - parse <text...>   print the structured weather and composition props (LLM if GROQ_API_KEY is set)\n\
             - demo [n]          push n fake renders through admission + scheduler\n"
        );
        std::process::exit(2);
    }

    match args[1].as_str() {
        "parse" => {
            let text = args[2..].join(" ");
            if text.trim().is_empty() {
                eprintln!("usage: renderctl parse <text...>");
                std::process::exit(2);
            }
            parse(&text).await?;
        }
        "demo" => {
            let n: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(6);
            demo(n).await?;
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn parse(text: &str) -> anyhow::Result<()> {
    // the model is used when a key is configured
    let parser = FallbackParser::from_config(Config::from_env()?.llm)?;
    let data = parser.parse(text).await?;

    println!("=== WEATHER ===");
    println!("{}", serde_json::to_string_pretty(&data)?);
    println!("\n=== PROPS ===");
    println!("{}", serde_json::to_string_pretty(&data.to_props())?);
    Ok(())
}

/// Concurrency 2, queue depth 4, timeout 400ms; fake renders take 50..600ms.
async fn demo(n: usize) -> anyhow::Result<()> {
    let registry = JobRegistry::new();
    let scheduler = Scheduler::new(
        registry.clone(),
        SchedulerConfig {
            max_concurrency: 2,
            render_timeout: Duration::from_millis(400),
        },
    );
    let admission = AdmissionController::new(
        scheduler.clone(),
        AdmissionConfig { max_queue_depth: 4 },
    );

    let mut handles = Vec::new();
    for i in 0..n {
        let admitted = match admission.admit() {
            Ok(a) => a,
            Err(e) => {
                println!("request {i}: rejected ({e})");
                continue;
            }
        };
        let id = admitted.job().id;
        let ms: u64 = rand::thread_rng().gen_range(50..600);
        println!("request {i}: job {id} admitted, fake render {ms}ms");

        handles.push(tokio::spawn(admitted.submit(move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("temp/render-demo-{i}.mp4"))
        })));
    }

    let status = QueueStatus::collect(&scheduler, &admission);
    println!("\n=== QUEUE ===");
    println!("{}", serde_json::to_string_pretty(&status)?);

    for h in handles {
        let _ = h.await?;
    }

    println!("\n=== JOBS ===");
    let mut jobs = registry.list();
    jobs.sort_by_key(|j| j.created_at);
    for job in &jobs {
        let detail = match (&job.result, &job.error) {
            (Some(r), _) => r.clone(),
            (_, Some(e)) => format!("{}: {}", e.kind.as_str(), e.message),
            _ => String::new(),
        };
        println!("{}  {:<10}  {}", job.id, job.status.as_str(), detail);
    }

    let reclaimer = Reclaimer::new(registry.clone(), ReclaimerConfig::default());
    let removed = reclaimer.sweep_at(chrono::Utc::now() + chrono::Duration::hours(2));
    println!("\nsweep (as of +2h) removed {removed} jobs, {} left", registry.len());
    Ok(())
}
