#![cfg(unix)]

use embed_launch::config::{Mode, TrainingConfig};
use embed_launch::launch::{self, EXIT_NOT_FOUND};
use embed_launch::plan::{Entry, EnvVar, LaunchPlan};

fn shell(script: &str) -> LaunchPlan {
    LaunchPlan {
        run_name: "test".to_string(),
        env: Vec::new(),
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    }
}

#[test_log::test(tokio::test)]
async fn forwards_success() {
    assert_eq!(launch::run(&shell("exit 0")).await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn forwards_failure_code_unchanged() {
    assert_eq!(launch::run(&shell("exit 3")).await.unwrap(), 3);
    assert_eq!(launch::run(&shell("exit 255")).await.unwrap(), 255);
}

#[test_log::test(tokio::test)]
async fn signal_death_maps_to_shell_convention() {
    let code = launch::run(&shell("kill -TERM $$")).await.unwrap();
    assert_eq!(code, 128 + 15);
}

#[test_log::test(tokio::test)]
async fn child_sees_plan_environment() {
    let config = TrainingConfig::preset(Mode::Finetune).unwrap();
    let mut plan = LaunchPlan::from_config(&config, &Entry::default());
    plan.program = "sh".to_string();
    plan.args = vec![
        "-c".to_string(),
        r#"[ "$WANDB_PROJECT" = ko-e5 ] && [ "$WANDB_NAME" = finetune-bs512-ep2-lr1e-5-240919 ] && [ "$CUDA_VISIBLE_DEVICES" = 0,1,2,3,4,5,6,7 ]"#
            .to_string(),
    ];
    assert_eq!(launch::run(&plan).await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn child_receives_arguments_verbatim() {
    let mut plan = shell(r#"[ "$0" = "with space" ] && [ "$1" = "it's" ]"#);
    plan.args.push("with space".to_string());
    plan.args.push("it's".to_string());
    plan.env.push(EnvVar {
        name: "UNUSED".to_string(),
        value: "1".to_string(),
    });
    assert_eq!(launch::run(&plan).await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn missing_launcher_is_an_error() {
    let config = TrainingConfig::preset(Mode::Pretrain).unwrap();
    let entry = Entry {
        launcher: "embed-launch-no-such-launcher".to_string(),
        script: "train.py".to_string(),
    };
    let plan = LaunchPlan::from_config(&config, &entry);
    let err = launch::run(&plan).await.unwrap_err();
    assert!(format!("{err:#}").contains("embed-launch-no-such-launcher"));
    assert_eq!(launch::exit_code_for_error(&err), EXIT_NOT_FOUND);
}
