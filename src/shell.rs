//! Interactive shell: a thin line-oriented REPL over the kernel engines.

use std::fs;
use std::io::{self, BufRead, Write};

use crate::config::FILE_FILL_BYTE;
use crate::kernel::Kernel;
use crate::pmem::Pid;

pub struct Shell {
    kernel: Kernel,
}

const HELP: &str = "\
Commands:
  help             - Show this help
  ps               - List all simulated processes
  create [time]    - Create a new process with optional total time (default: 10)
  create -f <file> - Create a process from .pc script file
  kill <pid>       - Force terminate a process
  tick [n]         - Advance the simulation by n ticks (default: 1)
  run <pid>        - Manually schedule a process to run
  block <pid> [t]  - Block a process for t ticks (default: 5)
  wakeup <pid>     - Wake up a blocked process
  pagetable <pid>  - Display page table for a process
  mem              - Display physical memory status
  memstats [pid]   - Display memory statistics (system or per-process)
  exec <script>    - Run shell commands from a file
  format           - Re-format the file system
  fsinfo           - Display file system information
  inode <num>      - Display one inode
  ls [path]        - List a directory
  cd <path>        - Change the current directory
  mkdir <path>     - Create a directory
  touch <path>     - Create an empty file
  rm <path>        - Remove a file
  fopen <path>     - Open a file, print its descriptor
  fclose <fd>      - Close a descriptor
  fread <fd> <n>   - Read n bytes from a descriptor
  fwrite <fd> <n>  - Write n fill bytes to a descriptor
  devs             - Display device ownership
  exit             - Quit";

impl Shell {
    pub fn new(kernel: Kernel) -> Shell {
        Shell { kernel }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            print!("tinix> ");
            let _ = io::stdout().flush();

            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }

            let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if args.is_empty() {
                continue;
            }
            if args[0] == "exit" || args[0] == "quit" {
                break;
            }
            self.execute_command(&args);
        }
    }

    fn parse_pid(arg: Option<&String>) -> Option<Pid> {
        arg.and_then(|s| s.parse().ok())
    }

    fn execute_command(&mut self, args: &[String]) {
        let cmd = args[0].as_str();
        if cmd == "exec" {
            match args.get(1) {
                Some(path) => {
                    let path = path.clone();
                    self.execute_script(&path);
                }
                None => println!("Usage: exec <script>"),
            }
            return;
        }

        let pm = self.kernel.process_manager_mut();
        match cmd {
            "help" => println!("{}", HELP),

            "ps" => pm.dump_processes(),

            "create" => {
                if args.len() >= 3 && args[1] == "-f" {
                    match pm.create_process_from_file(&args[2]) {
                        Ok(pid) => println!("Created process PID: {} from {}", pid, args[2]),
                        Err(e) => println!("Failed to load program: {}", e),
                    }
                } else {
                    let total_time = args
                        .get(1)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(10);
                    let pid = pm.create_process(total_time);
                    println!("Created process PID: {}", pid);
                }
            }

            "kill" => match Self::parse_pid(args.get(1)) {
                Some(pid) => pm.terminate_process(pid),
                None => println!("Usage: kill <pid>"),
            },

            "tick" => {
                let n: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                for _ in 0..n {
                    pm.tick();
                }
            }

            "run" => match Self::parse_pid(args.get(1)) {
                Some(pid) => pm.run_process(pid),
                None => println!("Usage: run <pid>"),
            },

            "block" => match Self::parse_pid(args.get(1)) {
                Some(pid) => {
                    let duration = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);
                    pm.block_process(pid, duration);
                }
                None => println!("Usage: block <pid> [ticks]"),
            },

            "wakeup" => match Self::parse_pid(args.get(1)) {
                Some(pid) => pm.wakeup_process(pid),
                None => println!("Usage: wakeup <pid>"),
            },

            "pagetable" | "pt" => match Self::parse_pid(args.get(1)) {
                Some(pid) => pm.memory().dump_page_table(pid),
                None => println!("Usage: pagetable <pid>"),
            },

            "mem" => pm.memory().dump_physical_memory(),

            "memstats" | "ms" => match Self::parse_pid(args.get(1)) {
                Some(pid) => {
                    let stats = pm.memory().process_stats(pid);
                    println!("Memory stats for PID {}:", pid);
                    println!("Memory Accesses: {}", stats.memory_accesses);
                    println!("Page Faults: {}", stats.page_faults);
                    if stats.memory_accesses > 0 {
                        let rate = stats.page_faults as f64 / stats.memory_accesses as f64 * 100.0;
                        println!("Fault Rate: {:.1}%", rate);
                    }
                }
                None => {
                    let stats = pm.memory().stats();
                    println!("Total Memory Accesses: {}", stats.memory_accesses);
                    println!("Total Page Faults: {}", stats.page_faults);
                    if stats.memory_accesses > 0 {
                        let rate = stats.page_faults as f64 / stats.memory_accesses as f64 * 100.0;
                        println!("Fault Rate: {:.1}%", rate);
                    }
                }
            },

            "format" => match pm.fs_mut().format() {
                Ok(()) => println!("File system formatted."),
                Err(e) => println!("Format failed: {}", e),
            },

            "fsinfo" => pm.fs().print_superblock(),

            "inode" => match args.get(1).and_then(|s| s.parse().ok()) {
                Some(inum) => pm.fs().print_inode(inum),
                None => println!("Usage: inode <num>"),
            },

            "ls" => {
                let path = args.get(1).map(String::as_str).unwrap_or(".");
                if let Err(e) = pm.fs().list_directory(path) {
                    println!("ls failed: {}", e);
                }
            }

            "cd" => match args.get(1) {
                Some(path) => {
                    if let Err(e) = pm.fs_mut().change_directory(path) {
                        println!("cd failed: {}", e);
                    }
                }
                None => println!("Usage: cd <path>"),
            },

            "mkdir" => match args.get(1) {
                Some(path) => match pm.fs_mut().create_directory(path) {
                    Ok(()) => println!("Created directory {}", path),
                    Err(e) => println!("mkdir failed: {}", e),
                },
                None => println!("Usage: mkdir <path>"),
            },

            "touch" => match args.get(1) {
                Some(path) => match pm.fs_mut().create_file(path) {
                    Ok(()) => println!("Created file {}", path),
                    Err(e) => println!("touch failed: {}", e),
                },
                None => println!("Usage: touch <path>"),
            },

            "rm" => match args.get(1) {
                Some(path) => match pm.fs_mut().remove_file(path) {
                    Ok(()) => println!("Removed {}", path),
                    Err(e) => println!("rm failed: {}", e),
                },
                None => println!("Usage: rm <path>"),
            },

            "fopen" => match args.get(1) {
                Some(path) => match pm.fs_mut().open_file(path) {
                    Ok(fd) => println!("Opened {} (fd={})", path, fd),
                    Err(e) => println!("open failed: {}", e),
                },
                None => println!("Usage: fopen <path>"),
            },

            "fclose" => match args.get(1).and_then(|s| s.parse().ok()) {
                Some(fd) => pm.fs_mut().close_file(fd),
                None => println!("Usage: fclose <fd>"),
            },

            "fread" => {
                let fd = args.get(1).and_then(|s| s.parse().ok());
                let n: Option<usize> = args.get(2).and_then(|s| s.parse().ok());
                match (fd, n) {
                    (Some(fd), Some(n)) => {
                        let mut buf = vec![0u8; n];
                        match pm.fs_mut().read_file(fd, &mut buf) {
                            Ok(read) => {
                                println!("Read {} bytes: {:?}", read, String::from_utf8_lossy(&buf[..read]))
                            }
                            Err(e) => println!("read failed: {}", e),
                        }
                    }
                    _ => println!("Usage: fread <fd> <n>"),
                }
            }

            "fwrite" => {
                let fd = args.get(1).and_then(|s| s.parse().ok());
                let n: Option<usize> = args.get(2).and_then(|s| s.parse().ok());
                match (fd, n) {
                    (Some(fd), Some(n)) => {
                        let buf = vec![FILE_FILL_BYTE; n];
                        match pm.fs_mut().write_file(fd, &buf) {
                            Ok(written) => println!("Wrote {} bytes", written),
                            Err(e) => println!("write failed: {}", e),
                        }
                    }
                    _ => println!("Usage: fwrite <fd> <n>"),
                }
            }

            "devs" => pm.devices().dump(),

            _ => println!("Unknown command '{}'. Try 'help'.", cmd),
        }
    }

    /// Run shell commands from a file, one per line; `#` starts a comment.
    fn execute_script(&mut self, path: &str) {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                println!("Cannot open script {}: {}", path, e);
                return;
            }
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            println!("tinix> {}", line);
            self.execute_command(&args);
        }
        println!("Script execution completed.");
    }
}
