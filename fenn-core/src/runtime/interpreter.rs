//! 解释器与调度器
//!
//! 持有常量池、全局表、字符串池与进程模板，驱动按时间片
//! 轮转的协作式进程调度。运行链表用 slab 加整数索引表示，
//! 链表拓扑只由调度器改动。

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, trace};

use super::object::{
    Function, NativeKind, NativeReg, ObjNative, ObjString, ProcessTemplate, StringPool,
};
use super::process::{CallFrame, Process, ProcessStatus, SLOT_ANGLE, SLOT_X, SLOT_Y};
use super::stdlib;
use super::value::Value;
use crate::compiler::{CompileError, Parser};

/// 宿主帧时钟
///
/// 调度器在两次让出之间向宿主索取 `dt`（距上次 tick 的秒数）
/// 并轮询是否继续。
pub trait HostClock {
    /// 返回距上次 tick 的秒数
    fn tick(&mut self) -> f64;
    /// 宿主是否希望继续运行
    fn should_continue(&mut self) -> bool;
}

/// 非根进程的渲染视图：约定槽位 x / y / angle
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessView {
    pub id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

/// 解释器
pub struct Interpreter {
    /// 去重后的常量池，`Constant n` 按索引引用
    pub(crate) constants: Vec<Value>,
    /// 全局变量表，插入与更新统一走 define
    pub(crate) globals: HashMap<String, Value>,
    /// 驻留字符串池
    pub(crate) strings: StringPool,
    /// 进程模板（声明顺序）
    pub(crate) templates: Vec<Rc<ProcessTemplate>>,

    // 进程存储：slab + 双向索引链表
    slab: Vec<Option<Box<Process>>>,
    free: Vec<usize>,
    first: Option<usize>,
    last: Option<usize>,
    /// 本帧中途创建、下一帧帧首拼接的实例
    spawn_queue: Vec<usize>,
    main_slot: usize,

    next_pid: u32,
    current_frame: u64,
    pub(crate) must_exit: bool,
    pub(crate) exit_value: i32,

    started: Instant,
    /// 编译产物：根进程的顶层函数
    main_function: Option<Rc<Function>>,
    /// 输出接管钩子（测试与嵌入宿主用）
    pub(crate) print_hook: Option<Box<dyn FnMut(&str)>>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("constants", &self.constants)
            .field("globals", &self.globals)
            .field("templates", &self.templates)
            .field("next_pid", &self.next_pid)
            .field("current_frame", &self.current_frame)
            .field("must_exit", &self.must_exit)
            .field("exit_value", &self.exit_value)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// 创建解释器并注册核心原生函数
    pub fn new() -> Self {
        let mut interp = Self {
            constants: Vec::new(),
            globals: HashMap::new(),
            strings: StringPool::new(),
            templates: Vec::new(),
            slab: Vec::new(),
            free: Vec::new(),
            first: None,
            last: None,
            spawn_queue: Vec::new(),
            main_slot: 0,
            next_pid: 1,
            current_frame: 0,
            must_exit: false,
            exit_value: 0,
            started: Instant::now(),
            main_function: None,
            print_hook: None,
        };
        let main = interp.new_process("_main_", true);
        let slot = interp.insert_slab(main);
        interp.main_slot = slot;
        interp.link_tail(slot);
        stdlib::register_core(&mut interp);
        interp
    }

    fn new_process(&mut self, name: &str, root: bool) -> Box<Process> {
        let id = self.next_pid;
        self.next_pid += 1;
        Box::new(Process::new(name, id, root))
    }

    // ==================== 常量池与字符串池 ====================

    /// 追加常量，按值相等规则去重
    ///
    /// 池满（256 项）返回 None
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        for (i, existing) in self.constants.iter().enumerate() {
            if existing.equals(&value) {
                return Some(i as u8);
            }
        }
        if self.constants.len() >= u8::MAX as usize + 1 {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    /// 常量池内容
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// 驻留字符串
    pub fn intern(&mut self, s: &str) -> Rc<ObjString> {
        self.strings.intern(s)
    }

    // ==================== 全局表 ====================

    /// 定义或更新全局变量
    pub fn define(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// 是否存在全局变量
    pub fn contains(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// 读取全局变量
    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    // ==================== 原生函数与宿主注册 ====================

    /// 注册原生函数为全局绑定
    pub fn define_native(&mut self, name: &str, kind: NativeKind) {
        let native = Rc::new(ObjNative::new(name, kind));
        self.define(name, Value::native(native));
    }

    /// 按表批量注册原生函数
    pub fn define_natives(&mut self, natives: &[NativeReg]) {
        for reg in natives {
            self.define_native(reg.name, reg.kind);
        }
    }

    /// 注册宿主全局变量，名字已占用时返回 false
    pub fn register_global(&mut self, name: &str, value: Value) -> bool {
        if self.contains(name) {
            return false;
        }
        self.define(name, value);
        true
    }

    pub fn register_number(&mut self, name: &str, value: f64) -> bool {
        self.register_global(name, Value::number(value))
    }

    pub fn register_boolean(&mut self, name: &str, value: bool) -> bool {
        self.register_global(name, Value::boolean(value))
    }

    pub fn register_string(&mut self, name: &str, value: &str) -> bool {
        let s = self.intern(value);
        self.register_global(name, Value::string(s))
    }

    pub fn register_nil(&mut self, name: &str) -> bool {
        self.register_global(name, Value::Nil)
    }

    // ==================== 编译 ====================

    /// 编译源码并装入根进程
    ///
    /// 所有语法错误经 tracing 报告，返回第一个错误。
    pub fn compile(&mut self, source: &str) -> Result<(), CompileError> {
        let function = {
            let mut parser = Parser::new(self, source);
            parser.compile()?
        };
        debug!(target: "fenn::compiler", bytes = function.chunk.len(), "script compiled");
        self.main_function = Some(function.clone());
        if let Some(main) = self.slab[self.main_slot].as_mut() {
            main.reset_stack();
            main.status = ProcessStatus::Running;
            main.frames.push(CallFrame {
                function,
                ip: 0,
                slots: 0,
            });
        }
        Ok(())
    }

    /// 编译产物：根进程顶层函数
    pub fn main_function(&self) -> Option<&Rc<Function>> {
        self.main_function.as_ref()
    }

    /// 已声明的进程模板
    pub fn templates(&self) -> &[Rc<ProcessTemplate>] {
        &self.templates
    }

    pub(crate) fn add_template(&mut self, template: Rc<ProcessTemplate>) {
        self.templates.push(template);
    }

    // ==================== 进程生命周期 ====================

    fn insert_slab(&mut self, process: Box<Process>) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slab[slot] = Some(process);
                slot
            }
            None => {
                self.slab.push(Some(process));
                self.slab.len() - 1
            }
        }
    }

    fn link_tail(&mut self, slot: usize) {
        if let Some(proc) = self.slab[slot].as_mut() {
            proc.prev = self.last;
            proc.next = None;
        }
        match self.last {
            Some(tail) => {
                if let Some(prev) = self.slab[tail].as_mut() {
                    prev.next = Some(slot);
                }
            }
            None => self.first = Some(slot),
        }
        self.last = Some(slot);
    }

    fn unlink_and_free(&mut self, slot: usize) {
        let (prev, next) = match self.slab[slot].as_ref() {
            Some(p) => (p.prev, p.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(proc) = self.slab[p].as_mut() {
                    proc.next = next;
                }
            }
            None => self.first = next,
        }
        match next {
            Some(n) => {
                if let Some(proc) = self.slab[n].as_mut() {
                    proc.prev = prev;
                }
            }
            None => self.last = prev,
        }
        if let Some(proc) = self.slab[slot].take() {
            trace!(target: "fenn::sched", id = proc.id, name = %proc.name, "process reaped");
        }
        self.free.push(slot);
    }

    /// 依据模板生成新实例并排队到下一帧
    ///
    /// 返回新实例的 id。实例先播种约定槽位，再按声明顺序
    /// 复制参数。
    pub(crate) fn spawn_instance(&mut self, template: &Rc<ProcessTemplate>, args: &[Value]) -> u32 {
        let mut child = self.new_process(&template.name, false);
        child.seed_visual_locals();
        for arg in args {
            child.stack.push(arg.clone());
        }
        child.frames.push(CallFrame {
            function: template.function.clone(),
            ip: 0,
            slots: 0,
        });
        let id = child.id;
        trace!(target: "fenn::sched", id, name = %template.name, "instance queued");
        let slot = self.insert_slab(child);
        self.spawn_queue.push(slot);
        id
    }

    /// 按名杀死进程，命中返回 true
    ///
    /// 按 slab 顺序遍历（正在执行的进程此刻不在 slab 中，
    /// 它的自杀在派发循环里单独处理），排队中的实例同样可杀。
    pub fn kill_process_by_name(&mut self, name: &str) -> bool {
        for entry in self.slab.iter_mut().flatten() {
            if entry.name == name && entry.is_alive() {
                entry.status = ProcessStatus::Killed;
                return true;
            }
        }
        false
    }

    /// 按 id 杀死进程，命中返回 true
    pub fn kill_process_by_id(&mut self, id: u32) -> bool {
        for entry in self.slab.iter_mut().flatten() {
            if entry.id == id && entry.is_alive() {
                entry.status = ProcessStatus::Killed;
                return true;
            }
        }
        false
    }

    /// 按名查找进程 id
    pub fn find_process(&self, name: &str) -> Option<u32> {
        self.slab
            .iter()
            .flatten()
            .find(|p| p.name == name)
            .map(|p| p.id)
    }

    /// 进程状态
    pub fn process_status(&self, id: u32) -> Option<ProcessStatus> {
        self.slab.iter().flatten().find(|p| p.id == id).map(|p| p.status)
    }

    /// 进程求值栈深度（测试与诊断用）
    pub fn process_stack_depth(&self, id: u32) -> Option<usize> {
        self.slab
            .iter()
            .flatten()
            .find(|p| p.id == id)
            .map(|p| p.stack_depth())
    }

    /// 进程的渲染视图
    pub fn process_view(&self, id: u32) -> Option<ProcessView> {
        self.slab
            .iter()
            .flatten()
            .find(|p| p.id == id)
            .map(|p| Self::view_of(p))
    }

    fn view_of(proc: &Process) -> ProcessView {
        ProcessView {
            id: proc.id,
            name: proc.name.clone(),
            x: proc.well_known(SLOT_X).unwrap_or(0.0),
            y: proc.well_known(SLOT_Y).unwrap_or(0.0),
            angle: proc.well_known(SLOT_ANGLE).unwrap_or(0.0),
        }
    }

    /// 宿主渲染用：链表顺序的非根运行中进程视图
    pub fn visible_processes(&self) -> Vec<ProcessView> {
        let mut views = Vec::new();
        let mut cursor = self.first;
        while let Some(slot) = cursor {
            let Some(proc) = self.slab[slot].as_ref() else {
                break;
            };
            if !proc.root && proc.status == ProcessStatus::Running {
                views.push(Self::view_of(proc));
            }
            cursor = proc.next;
        }
        views
    }

    /// 存活进程数
    pub fn alive_count(&self) -> u32 {
        self.slab.iter().flatten().filter(|p| p.is_alive()).count() as u32
    }

    /// 是否还有存活进程
    pub fn has_alive_processes(&self) -> bool {
        self.slab.iter().flatten().any(|p| p.is_alive())
    }

    /// 存活进程快照 (id, name)，供上下文原生函数查询
    pub(crate) fn live_snapshot(&self) -> Vec<(u32, String)> {
        self.slab
            .iter()
            .flatten()
            .filter(|p| p.is_alive())
            .map(|p| (p.id, p.name.clone()))
            .collect()
    }

    /// 请求退出调度
    pub fn request_exit(&mut self, value: i32) {
        self.must_exit = true;
        self.exit_value = value;
    }

    /// 已执行的宿主帧数
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// 启动以来的秒数
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    // ==================== 调度 ====================

    /// 执行一个宿主帧
    ///
    /// 帧首把上一帧排队的新实例拼接到链表尾部，然后按插入
    /// 顺序遍历：累加 dt，未到间隔的进程留到下一帧；执行后
    /// 扣除间隔保留小数进位；死亡进程在下次访问时摘除。
    pub fn run_frame(&mut self, dt: f64) {
        let queued = std::mem::take(&mut self.spawn_queue);
        for slot in queued {
            self.link_tail(slot);
            trace!(target: "fenn::sched", slot, "instance spliced");
        }
        self.current_frame += 1;

        let mut cursor = self.first;
        while let Some(slot) = cursor {
            let (next, status) = match self.slab[slot].as_ref() {
                Some(p) => (p.next, p.status),
                None => break,
            };
            match status {
                ProcessStatus::Running => {
                    // 取出进程执行，避免与 slab 的可变借用冲突；
                    // 空出的槽位不在 free 表中，不会被新实例占用
                    if let Some(mut proc) = self.slab[slot].take() {
                        proc.frame_timer += dt;
                        if proc.frame_timer >= proc.frame_interval {
                            let yielded = self.step(&mut proc);
                            if yielded && proc.status == ProcessStatus::Running {
                                proc.frame_timer -= proc.frame_interval;
                            }
                        }
                        self.slab[slot] = Some(proc);
                    }
                }
                ProcessStatus::Dead | ProcessStatus::Killed => {
                    self.unlink_and_free(slot);
                }
                // 保留状态：跳过但算作存活
                _ => {}
            }
            if self.must_exit {
                break;
            }
            cursor = next;
        }
    }

    /// 以宿主时钟驱动调度直至退出请求或全部进程死亡
    ///
    /// 返回退出码（缺省 0）。
    pub fn run<H: HostClock>(&mut self, host: &mut H) -> i32 {
        self.must_exit = false;
        while !self.must_exit && host.should_continue() {
            let dt = host.tick();
            self.run_frame(dt);
            if !self.has_alive_processes() {
                break;
            }
        }
        self.exit_value
    }

    // ==================== 输出 ====================

    /// 接管打印输出
    pub fn set_print_hook(&mut self, hook: Box<dyn FnMut(&str)>) {
        self.print_hook = Some(hook);
    }

    /// 经由钩子或 stdout 输出文本
    pub(crate) fn out(&mut self, text: &str) {
        match &mut self.print_hook {
            Some(hook) => hook(text),
            None => print!("{text}"),
        }
    }

    /// 反汇编根函数与全部进程模板
    pub fn disassemble(&self) -> String {
        use super::debug::disassemble_chunk;
        let mut out = String::new();
        if let Some(function) = &self.main_function {
            out.push_str(&disassemble_chunk(&function.chunk, &self.constants, &function.name));
        }
        for template in &self.templates {
            out.push_str(&disassemble_chunk(
                &template.function.chunk,
                &self.constants,
                &template.name,
            ));
        }
        out
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
