mod launcher;

pub use launcher::CommandRelauncher;
