use std::process::ExitCode;

fn main() -> ExitCode {
    llm_infer::run()
}
