use std::env;

use anyhow::Result;
use mockmate_feedback::feedback::{AnswerSubmission, Evaluation, Tracking};
use mockmate_feedback::{FeedbackResult, PollRequest};

fn print_usage() {
    eprintln!("Usage: poll_feedback <session-id> <question-id> [answer text...]");
    eprintln!("  With answer text the answer is submitted first, otherwise the existing evaluation is polled.");
}

fn print_evaluation(evaluation: &Evaluation) {
    println!("\n✅ Feedback ready");
    println!("{:-<60}", "");
    if let Some(score) = evaluation.score {
        println!("Score: {}", score);
    }
    if let Some(feedback) = &evaluation.feedback {
        println!("\n{}", feedback);
    }
    if !evaluation.strengths.is_empty() {
        println!("\n💪 Strengths:");
        for strength in &evaluation.strengths {
            println!("   - {}", strength);
        }
    }
    if !evaluation.improvements.is_empty() {
        println!("\n🎯 Improvements:");
        for improvement in &evaluation.improvements {
            println!("   - {}", improvement);
        }
    }
    println!("{:-<60}", "");
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }
    let session_id = args[0].clone();
    let question_id = args[1].clone();
    let answer_text = args[2..].join(" ");

    let service = mockmate_feedback::connect()?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let on_update = move |result: FeedbackResult| {
        let _ = tx.send(result);
    };

    if answer_text.trim().is_empty() {
        let request = PollRequest::new(session_id, question_id)?;
        println!("🔄 Waiting for feedback on {}...", request);
        service.registry().start(request, on_update)?;
    } else {
        let submission = AnswerSubmission {
            session_id,
            question_id,
            answer_text,
            response_time: None,
        };
        match service.submit_and_track(submission, on_update).await? {
            Tracking::Evaluated(_) => {}
            Tracking::Polling(handle) => println!("🔄 Answer queued, waiting for feedback on {}...", handle.request()),
        }
    }

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(FeedbackResult::Pending) => println!("⏳ Evaluation in progress..."),
                Some(FeedbackResult::Ready(evaluation)) => {
                    print_evaluation(&evaluation);
                    return Ok(());
                }
                Some(FeedbackResult::Failed(e)) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                let cancelled = service.registry().cancel_all();
                println!("\n🛑 Stopped waiting ({} poll cancelled)", cancelled);
                std::process::exit(130);
            }
        }
    }
}
