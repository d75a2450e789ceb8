//! End-to-end scenarios against a live jobber installation.
//!
//! These need root, a `normuser` account, and the jobber service installed.
//! Run with `cargo test -p jobber-verify -- --ignored`.

use jobber_verify::{Verifier, VerifyConfig};
use serial_test::serial;

fn verifier() -> Verifier {
    Verifier::new(VerifyConfig::load(None).unwrap()).unwrap()
}

#[test]
#[serial]
#[ignore = "requires root and a running jobber service"]
fn normuser_job_is_listed_for_owner_and_root() {
    let v = verifier();
    v.remove_jobfiles().unwrap();
    v.restart_service().unwrap();
    let before = v.runner_proc_info().unwrap();

    let jobfile = v.make_jobfile("foo", "/bin/true", Some("*"), None);
    assert_eq!(v.install_jobfile("normuser", &jobfile).unwrap(), 1);
    assert_eq!(v.install_jobfile("normuser", &jobfile).unwrap(), 1);

    v.list_should_return("normuser", "foo", false).unwrap();
    v.list_should_contain("root", "foo", true).unwrap();

    v.runner_procs_should_be_same(&before).unwrap();
    v.runner_procs_should_not_have_tty().unwrap();
    v.master_should_not_have_crashed().unwrap();
    v.runner_should_not_have_crashed("normuser").unwrap();

    v.remove_jobfiles().unwrap();
}

#[test]
#[serial]
#[ignore = "requires root and a running jobber service"]
fn restart_keeps_workers_detached() {
    let v = verifier();
    v.restart_service().unwrap();
    v.runner_procs_should_not_have_tty().unwrap();
    v.master_should_not_have_crashed().unwrap();
    v.runner_should_not_have_crashed("root").unwrap();
}

#[test]
#[serial]
#[ignore = "requires root and a running jobber service"]
fn pause_resume_and_test_a_root_job() {
    let v = verifier();
    let jobfile = v.make_jobfile("bar", "/bin/true", None, None);
    assert_eq!(v.install_jobfile("root", &jobfile).unwrap(), 1);

    v.pause_job("root", "bar").unwrap();
    v.resume_job("root", "bar").unwrap();
    v.test_job("root", "bar").unwrap();
    assert!(!v.jobber_log("root").unwrap().is_empty());

    v.remove_jobfiles().unwrap();
}
