//! High-level commands produced by the parser and consumed by the
//! interpreter. A plain sum type, matched on the tag; no dispatch tables.

use crate::color::Color;
use crate::cursor::CursorMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleKind {
    IconAndWindow,
    Icon,
    Window,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub kind: TitleKind,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Positioning {
    Absolute,
    Relative,
}

/// Optional per-axis movement; `None` leaves the axis untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorMovement {
    pub positioning: Positioning,
    pub x: Option<i32>,
    pub y: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayErasure {
    FromCursorToDisplayEnd,
    FromDisplayStartToCursor,
    WholeDisplay,
    WholeDisplayWithScrollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineErasure {
    FromCursorToLineEnd,
    FromLineStartToCursor,
    WholeLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Insert,                           // IRM
    NewLine,                          // LNM
    Column132,                        // DECCOLM
    Origin,                           // DECOM
    AutoWrap,                         // DECAWM
    ReverseVideo,                     // DECSCNM
    SmoothScroll,                     // DECSCLM
    ApplicationCursorKeys,            // DECCKM
    AlternateScreenBuffer,            // ?47
    AlternateScreenBuffer1049,        // ?1049, clears the alternate screen
    BlinkingCursor,                   // ?12
    ShowCursor,                       // DECTCEM
    AutoRepeatKeys,                   // DECARM
    SendMouseXYOnPress,               // ?9, X10 compatibility
    SendMouseXYOnPressAndRelease,     // ?1000
    SendMouseXYOnPressDragAndRelease, // ?1002
    SendMouseXYAnyEvent,              // ?1003
    SendMouseReportUTF8,              // ?1005
    SendMouseReportSGR,               // ?1006
    BracketedPaste,                   // ?2004
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub mode: ModeKind,
    pub status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceReport {
    TerminalId,
    DeviceStatus,
    CursorPosition,
}

/// `[top, bottom)`; `None` resets to the full screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollingRegion {
    pub range: Option<(i32, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabClear {
    All,
    CurrentColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterAttributes {
    Normal,
    Bold,
    Faint,
    Italicized,
    Underlined,
    Blink,
    Inverse,
    Invisible,
    Crossed,
    DoublyUnderlined,
    NotBoldNotFaint,
    NotItalicized,
    NotUnderlined,
    NotBlink,
    NotInverse,
    NotInvisible,
    NotCrossed,
    ForegroundColor(Color),
    ForegroundDefault,
    BackgroundColor(Color),
    BackgroundDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSet {
    DecSpecialGraphics,                      // '0'
    AlternateCharacterRomStandardCharacters, // '1'
    AlternateCharacterRomSpecialGraphics,    // '2'
    Uk,                                      // 'A'
    UsAscii,                                 // 'B'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterSetDesignation {
    /// 0 = G0, 1 = G1, 2 = G2, 3 = G3.
    pub target: u8,
    pub set: CharacterSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleTarget {
    Both,
    Icon,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleOperation {
    Save,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleManipulation {
    pub target: TitleTarget,
    pub operation: TitleOperation,
}

/// One parsed terminal command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Clean UTF-8 text without control characters.
    Text(String),
    LineFeed,
    HorizontalTab(i32),
    CarriageReturn,
    BackSpace,
    Bell,
    ReverseIndex,
    Reset,
    SaveState,
    RestoreState,
    ScreenAlignmentTest,
    ChangeTitle(Title),
    ManipulateTitle(TitleManipulation),
    MoveCursor(CursorMovement),
    EraseInDisplay(DisplayErasure),
    EraseInLine(LineErasure),
    InsertLines(u32),
    DeleteLines(u32),
    DeleteCharacters(u32),
    InsertCharacters(u32),
    ScrollLines(i32),
    EraseCharacters(u32),
    RepeatLastCharacter(u32),
    Report(DeviceReport),
    ChangeMode(ModeChange),
    SetScrollingRegion(ScrollingRegion),
    ClearTab(TabClear),
    SetTab,
    SetCharacterAttributes(CharacterAttributes),
    /// 0 = G0, 1 = G1, 2 = G2, 3 = G3.
    SelectCharacterSet(u32),
    DesignateCharacterSet(CharacterSetDesignation),
    SetCursorStyle(Option<CursorMode>),
}
