fn main() {
    redirect_cli::run();
}
