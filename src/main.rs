fn main() -> std::process::ExitCode {
    kbchat_lib::run()
}
